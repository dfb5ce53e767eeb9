use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend;

const DEFAULT_ENV_PREFIX: &str = "GRAM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            api_key: String::new(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    backend::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("gram-tui/{} (+https://github.com/gram-tui/gram-tui)", crate::VERSION)
}

fn default_timeout() -> Duration {
    backend::DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
        }
    }
}

fn default_page_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.application_id.is_empty() {
        base.backend.application_id = other.backend.application_id;
    }
    if !other.backend.api_key.is_empty() {
        base.backend.api_key = other.backend.api_key;
    }
    if !other.backend.base_url.is_empty() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }
    if other.backend.timeout != Duration::ZERO {
        base.backend.timeout = other.backend.timeout;
    }

    if other.feed.page_limit != 0 {
        base.feed.page_limit = other.feed.page_limit;
    }

    if !other.session.handle.is_empty() {
        base.session.handle = other.session.handle;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    // Start from a fully unset config so merge_config only applies the
    // fields the environment actually provided.
    let mut cfg = empty_config();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn empty_config() -> Config {
    Config {
        backend: BackendConfig {
            application_id: String::new(),
            api_key: String::new(),
            base_url: String::new(),
            user_agent: String::new(),
            timeout: Duration::ZERO,
        },
        feed: FeedConfig { page_limit: 0 },
        session: SessionConfig {
            handle: String::new(),
        },
        ui: UIConfig {
            theme: String::new(),
        },
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.application_id" => cfg.backend.application_id = value,
        "backend.api_key" => cfg.backend.api_key = value,
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.timeout = duration;
            }
        }
        "feed.page_limit" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.page_limit = parsed;
            }
        }
        "session.handle" => cfg.session.handle = value,
        "ui.theme" => cfg.ui.theme = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gram-tui").join("config.yaml"))
}

pub fn save_backend_credentials(
    path: Option<PathBuf>,
    application_id: &str,
    api_key: &str,
    handle: &str,
) -> Result<PathBuf> {
    let application_id = application_id.trim();
    let api_key = api_key.trim();
    let handle = handle.trim();

    anyhow::ensure!(
        !application_id.is_empty(),
        "config: backend.application_id is required"
    );

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.backend.application_id = application_id.to_string();
    cfg.backend.api_key = api_key.to_string();
    if !handle.is_empty() {
        cfg.session.handle = handle.to_string();
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/gram-config.yaml")),
            env_prefix: Some("GRAM_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.feed.page_limit, 20);
        assert_eq!(cfg.backend.base_url, default_base_url());
        assert!(cfg.session.handle.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  application_id: app123\nfeed:\n  page_limit: 5\nsession:\n  handle: jacob\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("GRAM_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.backend.application_id, "app123");
        assert_eq!(cfg.feed.page_limit, 5);
        assert_eq!(cfg.session.handle, "jacob");
        assert_eq!(cfg.ui.theme, "default");
    }

    #[test]
    fn save_credentials_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save_backend_credentials(Some(path.clone()), "app", "key", "jacob").unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.backend.application_id, "app");
        assert_eq!(saved.session.handle, "jacob");
    }

    #[test]
    fn env_overrides() {
        env::set_var("GRAM_TEST_ENV_UI__THEME", "dracula");
        env::set_var("GRAM_TEST_ENV_FEED__PAGE_LIMIT", "7");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/gram-config.yaml")),
            env_prefix: Some("GRAM_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "dracula");
        assert_eq!(cfg.feed.page_limit, 7);
        env::remove_var("GRAM_TEST_ENV_UI__THEME");
        env::remove_var("GRAM_TEST_ENV_FEED__PAGE_LIMIT");
    }
}
