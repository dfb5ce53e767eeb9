use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.gram.example/1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const APPLICATION_ID_HEADER: &str = "X-Gram-Application-Id";
const API_KEY_HEADER: &str = "X-Gram-Api-Key";

/// Eager-resolve keys sent with every feed query so authors and comments
/// arrive inline instead of as bare object references.
pub const FEED_INCLUDE_KEYS: [&str; 3] = ["author", "comments", "comments.author"];

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub application_id: String,
    pub api_key: String,
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// A shared photo with its comments, as the rest of the crate sees it.
/// `image_url` is an opaque reference resolved by whatever renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub caption: Option<String>,
    pub image_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
}

/// A text reply attached to a post. `post_id` is a back-reference only;
/// the post owns the comment, never the other way around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub post_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Server acknowledgement for a saved comment.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentAck {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    application_id: String,
    api_key: String,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }
        if config.application_id.trim().is_empty() {
            bail!("backend client application id required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        Ok(Client {
            http,
            application_id: config.application_id,
            api_key: config.api_key,
            user_agent: config.user_agent,
            base_url,
        })
    }

    /// Fetches the newest posts, at most `limit` of them, with the given
    /// relation keys resolved inline. One request, one attempt.
    pub fn find_posts(&self, limit: u32, include: &[&str]) -> Result<Vec<Post>> {
        let url = self.class_url("Post")?;
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[
                ("limit", limit.to_string()),
                ("include", include.join(",")),
                ("order", "-createdAt".to_string()),
            ])
            .send()
            .context("backend: post query failed")?;
        let resp = check_status(resp)?;
        let envelope: Envelope<PostRecord> =
            resp.json().context("backend: decode post results")?;
        Ok(envelope
            .results
            .into_iter()
            .map(PostRecord::into_post)
            .collect())
    }

    /// Saves one comment against its owning post. One request, one attempt;
    /// the caller decides what to do with the local copy if this fails.
    pub fn save_comment(&self, post: &Post, author: &str, text: &str) -> Result<CommentAck> {
        let url = self.class_url("Comment")?;
        let body = NewCommentBody {
            text,
            author,
            post: post.id.as_str(),
        };
        let resp = self
            .http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .context("backend: comment save failed")?;
        let resp = check_status(resp)?;
        let ack: AckRecord = resp.json().context("backend: decode comment ack")?;
        Ok(CommentAck {
            id: ack.object_id,
            created_at: ack.created_at,
        })
    }

    fn class_url(&self, class: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("backend: base url cannot be a base"))?
            .extend(["classes", class]);
        Ok(url)
    }
}

fn check_status(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    bail!("backend: request failed with {status}: {snippet}");
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    object_id: String,
    #[serde(default)]
    author: Option<UserRecord>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    image: Option<FileRecord>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    comments: Vec<CommentRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRecord {
    object_id: String,
    #[serde(default)]
    author: Option<UserRecord>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct FileRecord {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckRecord {
    object_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct NewCommentBody<'a> {
    text: &'a str,
    author: &'a str,
    post: &'a str,
}

impl PostRecord {
    fn into_post(self) -> Post {
        let post_id = self.object_id;
        let comments = self
            .comments
            .into_iter()
            .map(|record| record.into_comment(&post_id))
            .collect();
        Post {
            author: self
                .author
                .map(|user| user.username)
                .unwrap_or_default(),
            caption: self.caption,
            image_url: self.image.map(|file| file.url).unwrap_or_default(),
            created_at: self.created_at,
            comments,
            id: post_id,
        }
    }
}

impl CommentRecord {
    fn into_comment(self, post_id: &str) -> Comment {
        Comment {
            id: self.object_id,
            author: self
                .author
                .map(|user| user.username)
                .unwrap_or_default(),
            text: self.text,
            post_id: post_id.to_string(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_post_envelope_with_inline_comments() {
        let payload = r#"{
            "results": [
                {
                    "objectId": "p1",
                    "author": {"username": "jacob"},
                    "caption": "golden hour",
                    "image": {"url": "https://cdn.example/p1.jpg"},
                    "createdAt": "2021-10-13T18:00:00Z",
                    "comments": [
                        {"objectId": "c1", "author": {"username": "alice"}, "text": "hi"},
                        {"objectId": "c2", "author": {"username": "bob"}, "text": "yo"}
                    ]
                }
            ]
        }"#;
        let envelope: Envelope<PostRecord> = serde_json::from_str(payload).unwrap();
        let posts: Vec<Post> = envelope
            .results
            .into_iter()
            .map(PostRecord::into_post)
            .collect();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "p1");
        assert_eq!(post.author, "jacob");
        assert_eq!(post.caption.as_deref(), Some("golden hour"));
        assert_eq!(post.image_url, "https://cdn.example/p1.jpg");
        assert_eq!(post.comments.len(), 2);
        assert_eq!(post.comments[0].text, "hi");
        assert_eq!(post.comments[0].post_id, "p1");
        assert_eq!(post.comments[1].author, "bob");
    }

    #[test]
    fn decodes_post_without_optional_fields() {
        let payload = r#"{"results": [{"objectId": "p2"}]}"#;
        let envelope: Envelope<PostRecord> = serde_json::from_str(payload).unwrap();
        let post = envelope.results.into_iter().next().unwrap().into_post();
        assert_eq!(post.id, "p2");
        assert!(post.author.is_empty());
        assert!(post.caption.is_none());
        assert!(post.comments.is_empty());
    }

    #[test]
    fn decodes_comment_ack() {
        let payload = r#"{"objectId": "c99", "createdAt": "2021-10-14T02:30:00Z"}"#;
        let ack: AckRecord = serde_json::from_str(payload).unwrap();
        assert_eq!(ack.object_id, "c99");
        assert!(ack.created_at.is_some());
    }

    #[test]
    fn rejects_client_without_application_id() {
        let err = Client::new(ClientConfig {
            user_agent: "gram-tui/test".into(),
            ..ClientConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("application id"));
    }

    #[test]
    fn class_url_extends_base_path() {
        let client = Client::new(ClientConfig {
            application_id: "app".into(),
            api_key: "key".into(),
            user_agent: "gram-tui/test".into(),
            base_url: Some("https://api.gram.example/1".into()),
            ..ClientConfig::default()
        })
        .unwrap();
        let url = client.class_url("Post").unwrap();
        assert_eq!(url.as_str(), "https://api.gram.example/1/classes/Post");
    }
}
