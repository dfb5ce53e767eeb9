use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

use crate::backend::{self, Comment, CommentAck, Post};

pub trait FeedService: Send + Sync {
    fn fetch_feed(&self, limit: u32) -> Result<Vec<Post>>;
}

pub trait CommentService: Send + Sync {
    fn save_comment(&self, post: &Post, author: &str, text: &str) -> Result<CommentAck>;
}

pub struct RemoteFeedService {
    client: Arc<backend::Client>,
}

impl RemoteFeedService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for RemoteFeedService {
    fn fetch_feed(&self, limit: u32) -> Result<Vec<Post>> {
        self.client
            .find_posts(limit, &backend::FEED_INCLUDE_KEYS)
            .context("fetch feed")
    }
}

pub struct RemoteCommentService {
    client: Arc<backend::Client>,
}

impl RemoteCommentService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RemoteCommentService {
    fn save_comment(&self, post: &Post, author: &str, text: &str) -> Result<CommentAck> {
        self.client
            .save_comment(post, author, text)
            .context("save comment")
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn fetch_feed(&self, limit: u32) -> Result<Vec<Post>> {
        let mut posts = sample_posts();
        posts.truncate(limit as usize);
        Ok(posts)
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn save_comment(&self, _post: &Post, _author: &str, _text: &str) -> Result<CommentAck> {
        Ok(CommentAck {
            id: random_id("srv"),
            created_at: Some(Utc::now()),
        })
    }
}

pub fn random_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}

fn sample_posts() -> Vec<Post> {
    let base = Utc.with_ymd_and_hms(2021, 10, 13, 18, 0, 0).unwrap();
    vec![
        Post {
            id: "sample-sunset".into(),
            author: "gram".into(),
            caption: Some("Sample feed. Configure a backend to see real posts.".into()),
            image_url: "https://cdn.gram.example/sample/sunset.jpg".into(),
            created_at: Some(base),
            comments: vec![
                Comment {
                    id: "sample-c1".into(),
                    author: "alice".into(),
                    text: "Love the colors".into(),
                    post_id: "sample-sunset".into(),
                    created_at: Some(base),
                },
                Comment {
                    id: "sample-c2".into(),
                    author: "bob".into(),
                    text: "Where was this taken?".into(),
                    post_id: "sample-sunset".into(),
                    created_at: Some(base),
                },
            ],
        },
        Post {
            id: "sample-latte".into(),
            author: "gram".into(),
            caption: Some("Comments you post here stay local.".into()),
            image_url: "https://cdn.gram.example/sample/latte.jpg".into(),
            created_at: Some(base),
            comments: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_feed_respects_limit() {
        let service = MockFeedService;
        let posts = service.fetch_feed(1).unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[test]
    fn mock_comment_acks_with_fresh_id() {
        let service = MockCommentService;
        let posts = MockFeedService.fetch_feed(20).unwrap();
        let first = service.save_comment(&posts[0], "alice", "hi").unwrap();
        let second = service.save_comment(&posts[0], "alice", "hi").unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id.starts_with("srv-"));
    }
}
