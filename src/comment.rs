use std::sync::Arc;

use chrono::Utc;

use crate::backend::{Comment, Post};
use crate::data::{self, CommentService};
use crate::feed::FeedStore;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("comment text is empty")]
    EmptyText,
    #[error("post {0} is no longer in the feed")]
    UnknownPost(String),
    #[error("comment saved locally but the remote save failed: {source}")]
    Remote {
        /// The optimistic comment, still present in the snapshot.
        comment: Comment,
        #[source]
        source: anyhow::Error,
    },
}

/// Appends one comment to one post: optimistically in the feed snapshot for
/// immediate rendering, then once against the remote store.
pub struct CommentSubmitter {
    feed: Arc<FeedStore>,
    service: Arc<dyn CommentService>,
}

impl CommentSubmitter {
    pub fn new(feed: Arc<FeedStore>, service: Arc<dyn CommentService>) -> Self {
        Self { feed, service }
    }

    /// Validates, appends locally, then saves remotely. The three terminal
    /// outcomes map onto the return value: `Err(EmptyText)` before any
    /// mutation, `Ok(comment)` once the remote store acknowledged (with the
    /// server-assigned id reconciled into the snapshot), and `Err(Remote)`
    /// when the save failed after the optimistic append. There is no
    /// rollback; the caller owns the failed entry.
    pub fn submit(&self, post: &Post, author: &str, text: &str) -> Result<Comment, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyText);
        }

        let mut comment = Comment {
            id: data::random_id("local"),
            author: author.to_string(),
            text: text.to_string(),
            post_id: post.id.clone(),
            created_at: Some(Utc::now()),
        };
        if !self.feed.append_comment(&post.id, comment.clone()) {
            return Err(SubmitError::UnknownPost(post.id.clone()));
        }

        match self.service.save_comment(post, author, text) {
            Ok(ack) => {
                self.feed
                    .reconcile_comment_id(&post.id, &comment.id, &ack.id);
                comment.id = ack.id;
                if ack.created_at.is_some() {
                    comment.created_at = ack.created_at;
                }
                Ok(comment)
            }
            Err(source) => Err(SubmitError::Remote { comment, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use parking_lot::Mutex;

    use crate::backend::CommentAck;
    use crate::data::FeedService;
    use crate::feed::{flatten, Row};

    struct FixedFeed {
        posts: Vec<Post>,
    }

    impl FeedService for FixedFeed {
        fn fetch_feed(&self, _limit: u32) -> Result<Vec<Post>> {
            Ok(self.posts.clone())
        }
    }

    struct ScriptedComments {
        outcomes: Mutex<Vec<Result<CommentAck>>>,
        saved: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedComments {
        fn new(outcomes: Vec<Result<CommentAck>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                saved: Mutex::new(Vec::new()),
            })
        }
    }

    impl CommentService for ScriptedComments {
        fn save_comment(&self, post: &Post, author: &str, text: &str) -> Result<CommentAck> {
            self.saved
                .lock()
                .push((post.id.clone(), author.to_string(), text.to_string()));
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                bail!("scripted comments exhausted");
            }
            outcomes.remove(0)
        }
    }

    fn post_with_comments(id: &str, texts: &[&str]) -> Post {
        Post {
            id: id.to_string(),
            author: "jacob".into(),
            caption: None,
            image_url: format!("https://cdn.example/{id}.jpg"),
            created_at: None,
            comments: texts
                .iter()
                .enumerate()
                .map(|(i, text)| Comment {
                    id: format!("{id}-c{i}"),
                    author: "carol".into(),
                    text: text.to_string(),
                    post_id: id.to_string(),
                    created_at: None,
                })
                .collect(),
        }
    }

    fn store_with(posts: Vec<Post>) -> Arc<FeedStore> {
        let store = Arc::new(FeedStore::new(Arc::new(FixedFeed { posts }), 20));
        store.refresh().unwrap();
        store
    }

    fn ack(id: &str) -> CommentAck {
        CommentAck {
            id: id.to_string(),
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn rejects_empty_and_whitespace_text() {
        let store = store_with(vec![post_with_comments("p0", &[])]);
        let service = ScriptedComments::new(vec![]);
        let submitter = CommentSubmitter::new(store.clone(), service.clone());
        let target = store.post(0).unwrap();

        for text in ["", "   ", "\t\n"] {
            let err = submitter.submit(&target, "alice", text).unwrap_err();
            assert!(matches!(err, SubmitError::EmptyText));
        }
        assert_eq!(store.row_count(0).unwrap(), 2);
        assert!(service.saved.lock().is_empty());
    }

    #[test]
    fn success_appends_before_prompt_and_reconciles_id() {
        let store = store_with(vec![post_with_comments("p0", &["hi", "yo"])]);
        let service = ScriptedComments::new(vec![Ok(ack("srv-42"))]);
        let submitter = CommentSubmitter::new(store.clone(), service.clone());
        let target = store.post(0).unwrap();

        let before = flatten(&target).len();
        let comment = submitter.submit(&target, "alice", "nice pic").unwrap();
        assert_eq!(comment.id, "srv-42");
        assert_eq!(comment.text, "nice pic");

        let after = store.post(0).unwrap();
        let rows = flatten(&after);
        assert_eq!(rows.len(), before + 1);
        assert!(
            matches!(rows[3], Row::Comment(_, c) if c.text == "nice pic" && c.author == "alice")
        );
        assert!(matches!(rows[4], Row::AddCommentPrompt(_)));
        assert_eq!(after.comments.last().unwrap().id, "srv-42");

        let saved = service.saved.lock();
        assert_eq!(saved.as_slice(), &[("p0".into(), "alice".into(), "nice pic".into())]);
    }

    #[test]
    fn submitted_text_is_trimmed() {
        let store = store_with(vec![post_with_comments("p0", &[])]);
        let service = ScriptedComments::new(vec![Ok(ack("srv-1"))]);
        let submitter = CommentSubmitter::new(store.clone(), service.clone());
        let target = store.post(0).unwrap();

        let comment = submitter.submit(&target, "alice", "  hello  ").unwrap();
        assert_eq!(comment.text, "hello");
        assert_eq!(service.saved.lock()[0].2, "hello");
    }

    #[test]
    fn remote_failure_leaves_optimistic_comment_in_place() {
        let store = store_with(vec![post_with_comments("p0", &["hi"])]);
        let service = ScriptedComments::new(vec![Err(anyhow::anyhow!("503 from backend"))]);
        let submitter = CommentSubmitter::new(store.clone(), service);
        let target = store.post(0).unwrap();

        let err = submitter.submit(&target, "alice", "hello").unwrap_err();
        let comment = match err {
            SubmitError::Remote { comment, .. } => comment,
            other => panic!("unexpected error: {other}"),
        };
        assert!(comment.id.starts_with("local-"));

        let after = store.post(0).unwrap();
        assert_eq!(after.comments.len(), 2);
        assert_eq!(after.comments[1].id, comment.id);
        assert_eq!(after.comments[1].text, "hello");
        assert_eq!(store.row_count(0).unwrap(), 4);
    }

    #[test]
    fn unknown_post_fails_before_remote_call() {
        let store = store_with(vec![post_with_comments("p0", &[])]);
        let service = ScriptedComments::new(vec![]);
        let submitter = CommentSubmitter::new(store, service.clone());
        let stale = post_with_comments("gone", &[]);

        let err = submitter.submit(&stale, "alice", "hello").unwrap_err();
        assert!(matches!(err, SubmitError::UnknownPost(id) if id == "gone"));
        assert!(service.saved.lock().is_empty());
    }

    // The scenario from the feed's rendering contract: a post with two
    // comments flattens to four rows; a successful submit makes it five,
    // with the new comment immediately before the prompt.
    #[test]
    fn two_comment_post_grows_to_five_rows() {
        let store = store_with(vec![post_with_comments("p0", &["hi", "yo"])]);
        let service = ScriptedComments::new(vec![Ok(ack("srv-9"))]);
        let submitter = CommentSubmitter::new(store.clone(), service);
        let target = store.post(0).unwrap();

        {
            let rows = flatten(&target);
            assert_eq!(rows.len(), 4);
            assert!(matches!(rows[0], Row::PostHeader(_)));
            assert!(matches!(rows[1], Row::Comment(_, c) if c.text == "hi"));
            assert!(matches!(rows[2], Row::Comment(_, c) if c.text == "yo"));
            assert!(matches!(rows[3], Row::AddCommentPrompt(_)));
        }

        submitter.submit(&target, "alice", "nice pic").unwrap();
        let after = store.post(0).unwrap();
        let rows = flatten(&after);
        assert_eq!(rows.len(), 5);
        assert!(
            matches!(rows[3], Row::Comment(_, c) if c.author == "alice" && c.text == "nice pic")
        );
    }
}
