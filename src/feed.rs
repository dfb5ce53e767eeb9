use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Comment, Post};
use crate::data::FeedService;

/// Rows in every section of the rendered feed beyond the comments
/// themselves: one post header and one add-comment prompt.
pub const EXTRA_ROWS_PER_POST: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed refresh failed: {0}")]
    Fetch(#[source] anyhow::Error),
    #[error("section {section} out of bounds, feed has {sections}")]
    SectionOutOfBounds { section: usize, sections: usize },
}

/// One presentation-ready list row derived from a post. Derived on every
/// flatten call and never stored, so rows borrow rather than own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Row<'a> {
    PostHeader(&'a Post),
    Comment(&'a Post, &'a Comment),
    AddCommentPrompt(&'a Post),
}

/// Flattens one post into its rows: header first, comments in chronological
/// order, then the add-comment prompt. A post with N comments always yields
/// exactly N + 2 rows, including N = 0.
pub fn flatten(post: &Post) -> Vec<Row<'_>> {
    let mut rows = Vec::with_capacity(post.comments.len() + EXTRA_ROWS_PER_POST);
    rows.push(Row::PostHeader(post));
    for comment in &post.comments {
        rows.push(Row::Comment(post, comment));
    }
    rows.push(Row::AddCommentPrompt(post));
    rows
}

/// Holds the most recently fetched posts. The snapshot is swapped whole on a
/// successful refresh and mutated in place only by comment appends; callers
/// on other threads must serialize access through one owner (the UI event
/// loop here).
pub struct FeedStore {
    service: Arc<dyn FeedService>,
    page_limit: u32,
    posts: RwLock<Vec<Post>>,
}

impl FeedStore {
    pub fn new(service: Arc<dyn FeedService>, page_limit: u32) -> Self {
        Self {
            service,
            page_limit,
            posts: RwLock::new(Vec::new()),
        }
    }

    /// Fetches one page of posts and replaces the snapshot. On failure the
    /// previous snapshot is left untouched and the caller decides whether to
    /// keep showing stale data. Single attempt, no retry.
    ///
    /// Known race: a refresh queried before a comment was appended but
    /// resolving after it overwrites the optimistic entry. Callers recover
    /// by refreshing again rather than merging snapshots.
    pub fn refresh(&self) -> Result<Vec<Post>, FeedError> {
        let fetched = self
            .service
            .fetch_feed(self.page_limit)
            .map_err(FeedError::Fetch)?;
        *self.posts.write() = fetched.clone();
        Ok(fetched)
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.read().clone()
    }

    pub fn post(&self, section: usize) -> Option<Post> {
        self.posts.read().get(section).cloned()
    }

    /// Number of posts in the current snapshot; one section per post.
    pub fn section_count(&self) -> usize {
        self.posts.read().len()
    }

    /// Rows in one section: the post's comments plus header and prompt.
    pub fn row_count(&self, section: usize) -> Result<usize, FeedError> {
        let posts = self.posts.read();
        match posts.get(section) {
            Some(post) => Ok(post.comments.len() + EXTRA_ROWS_PER_POST),
            None => Err(FeedError::SectionOutOfBounds {
                section,
                sections: posts.len(),
            }),
        }
    }

    /// Appends a comment to the snapshot entry for `post_id`. Returns false
    /// when the post is no longer in the snapshot.
    pub(crate) fn append_comment(&self, post_id: &str, comment: Comment) -> bool {
        let mut posts = self.posts.write();
        match posts.iter_mut().find(|post| post.id == post_id) {
            Some(post) => {
                post.comments.push(comment);
                true
            }
            None => false,
        }
    }

    /// Replaces a provisional comment id with the server-assigned one once
    /// the save is acknowledged. A miss is fine, it means a refresh already
    /// replaced the snapshot.
    pub(crate) fn reconcile_comment_id(&self, post_id: &str, provisional: &str, assigned: &str) {
        let mut posts = self.posts.write();
        if let Some(post) = posts.iter_mut().find(|post| post.id == post_id) {
            if let Some(comment) = post.comments.iter_mut().find(|c| c.id == provisional) {
                comment.id = assigned.to_string();
            }
        }
    }
}
