//! Configuration file parser for ~/.config/feedrelay/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()` and
//! everything can come from the environment instead (see [`Config::apply_env`]).
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use crate::engine::EngineOptions;
use crate::notify::DiscordOptions;
use crate::transport::RetryPolicy;
use crate::util::is_valid_url;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// HTTP timing for feed fetches and webhook posts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-attempt timeout for feed fetches, in milliseconds.
    pub timeout_ms: u64,
    /// Extra attempts after the first one fails.
    pub retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for webhook posts, in milliseconds.
    pub webhook_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            retries: 1,
            retry_delay_ms: 1000,
            webhook_timeout_ms: 10_000,
        }
    }
}

impl HttpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// Webhook URLs embed an access token; the custom `Debug` impl masks them so
/// they never end up in logs or error output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed URLs, processed in this order.
    pub feeds: Vec<String>,

    /// Destination for relayed items. Required to run.
    pub webhook_url: Option<String>,

    /// Destination for error reports. Falls back to `webhook_url`.
    pub error_webhook_url: Option<String>,

    /// SQLite checkpoint database. Defaults to `state.db` next to the config file.
    pub state_db: Option<PathBuf>,

    /// Key of the checkpoint document inside the database.
    pub state_key: String,

    /// Don't send error notifications for feed fetch/parse failures.
    pub suppress_feed_errors: bool,

    pub max_items_per_feed: usize,

    /// Display name override for webhook messages.
    pub username: Option<String>,

    pub avatar_url: Option<String>,

    /// Show the publish time on relayed items.
    pub include_timestamp: bool,

    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            webhook_url: None,
            error_webhook_url: None,
            state_db: None,
            state_key: "feedrelay-state.json".to_string(),
            suppress_feed_errors: false,
            max_items_per_feed: crate::engine::DEFAULT_MAX_ITEMS_PER_FEED,
            username: None,
            avatar_url: None,
            include_timestamp: true,
            http: HttpConfig::default(),
        }
    }
}

/// Mask webhook URLs in Debug output to prevent token leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feeds", &self.feeds)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .field(
                "error_webhook_url",
                &self.error_webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("state_db", &self.state_db)
            .field("state_key", &self.state_key)
            .field("suppress_feed_errors", &self.suppress_feed_errors)
            .field("max_items_per_feed", &self.max_items_per_feed)
            .field("username", &self.username)
            .field("avatar_url", &self.avatar_url)
            .field("include_timestamp", &self.include_timestamp)
            .field("http", &self.http)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "feeds",
        "webhook_url",
        "error_webhook_url",
        "state_db",
        "state_key",
        "suppress_feed_errors",
        "max_items_per_feed",
        "username",
        "avatar_url",
        "include_timestamp",
        "http",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge file
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Overlays environment variables on top of the file values.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    /// Empty values are treated as unset.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `RSS_FEED_URLS` | `feeds` (comma-separated) |
    /// | `DISCORD_WEBHOOK_URL` | `webhook_url` |
    /// | `ERROR_WEBHOOK_URL` | `error_webhook_url` |
    /// | `STATE_DB_PATH` | `state_db` |
    /// | `STATE_KEY` | `state_key` |
    /// | `SUPPRESS_FEED_ERROR_NOTIFICATIONS` | `suppress_feed_errors` (`true`/`1`) |
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(urls) = var("RSS_FEED_URLS") {
            self.feeds = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = var("DISCORD_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }
        if let Some(url) = var("ERROR_WEBHOOK_URL") {
            self.error_webhook_url = Some(url);
        }
        if let Some(path) = var("STATE_DB_PATH") {
            self.state_db = Some(PathBuf::from(path));
        }
        if let Some(key) = var("STATE_KEY") {
            self.state_key = key;
        }
        if let Some(flag) = var("SUPPRESS_FEED_ERROR_NOTIFICATIONS") {
            self.suppress_feed_errors = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
    }

    /// Checks that the configuration is complete enough to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "no feeds configured (set `feeds` or RSS_FEED_URLS)".to_string(),
            ));
        }
        if let Some(bad) = self.feeds.iter().find(|url| !is_valid_url(url)) {
            return Err(ConfigError::Invalid(format!("invalid feed URL: {bad}")));
        }

        match self.webhook_url.as_deref() {
            None => {
                return Err(ConfigError::Invalid(
                    "webhook URL missing (set `webhook_url` or DISCORD_WEBHOOK_URL)".to_string(),
                ))
            }
            // The URL itself is a secret, so it is left out of the message
            Some(url) if !is_valid_url(url) => {
                return Err(ConfigError::Invalid("webhook URL is not a valid http(s) URL".to_string()))
            }
            Some(_) => {}
        }
        if let Some(url) = self.error_webhook_url.as_deref() {
            if !is_valid_url(url) {
                return Err(ConfigError::Invalid(
                    "error webhook URL is not a valid http(s) URL".to_string(),
                ));
            }
        }

        if self.max_items_per_feed == 0 {
            return Err(ConfigError::Invalid(
                "max_items_per_feed must be at least 1".to_string(),
            ));
        }
        if self.http.timeout_ms == 0 || self.http.webhook_timeout_ms == 0 {
            return Err(ConfigError::Invalid("HTTP timeouts must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Checkpoint database path, defaulting to `state.db` in `config_dir`.
    pub fn state_db_path(&self, config_dir: &Path) -> PathBuf {
        self.state_db
            .clone()
            .unwrap_or_else(|| config_dir.join("state.db"))
    }

    pub fn webhook_secret(&self) -> Option<SecretString> {
        self.webhook_url.clone().map(SecretString::from)
    }

    pub fn error_webhook_secret(&self) -> Option<SecretString> {
        self.error_webhook_url.clone().map(SecretString::from)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_items_per_feed: self.max_items_per_feed,
            suppress_feed_errors: self.suppress_feed_errors,
        }
    }

    pub fn discord_options(&self) -> DiscordOptions {
        DiscordOptions {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            include_timestamp: self.include_timestamp,
            webhook_timeout: Duration::from_millis(self.http.webhook_timeout_ms),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
