use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend;
use crate::comment::CommentSubmitter;
use crate::config;
use crate::data::{self, CommentService, FeedService};
use crate::feed::FeedStore;
use crate::session;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let feed_service: Arc<dyn FeedService>;
    let comment_service: Arc<dyn CommentService>;
    let status: String;

    if cfg.backend.application_id.trim().is_empty() {
        feed_service = Arc::new(data::MockFeedService);
        comment_service = Arc::new(data::MockCommentService);
        status = format!(
            "No backend configured, showing the offline sample feed. Set backend.application_id in {} to connect.",
            friendly_config_path()
        );
    } else {
        let client = Arc::new(
            backend::Client::new(backend::ClientConfig {
                application_id: cfg.backend.application_id.clone(),
                api_key: cfg.backend.api_key.clone(),
                user_agent: cfg.backend.user_agent.clone(),
                base_url: Some(cfg.backend.base_url.clone()),
                timeout: Some(cfg.backend.timeout),
                http_client: None,
            })
            .context("create backend client")?,
        );
        feed_service = Arc::new(data::RemoteFeedService::new(client.clone()));
        comment_service = Arc::new(data::RemoteCommentService::new(client));
        status =
            "Press j/k to navigate, Enter on the prompt row to comment, r to refresh, q to quit."
                .to_string();
    }

    let feed = Arc::new(FeedStore::new(feed_service, cfg.feed.page_limit));
    let submitter = Arc::new(CommentSubmitter::new(feed.clone(), comment_service));
    let session = Arc::new(session::Manager::new(Some(cfg.session.handle.clone())));

    let options = ui::Options {
        status_message: status,
        feed,
        submitter,
        session,
        fetch_on_start: true,
    };

    let mut model = ui::Model::new(options);
    model.run()
}

fn friendly_config_path() -> String {
    let path = match config::default_path() {
        Some(path) => path,
        None => return "~/.config/gram-tui/config.yaml".to_string(),
    };
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            let mut display = String::from("~");
            if !stripped.as_os_str().is_empty() {
                display.push_str(&format!("/{}", stripped.display()));
            }
            return display;
        }
    }
    path.display().to_string()
}
