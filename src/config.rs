//! TOML configuration for burstwatch.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working setup against local Graylog and classifier
//! endpoints with the default rule table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::rules::{self, AlertRule};
use crate::detect::DetectError;
use crate::source::{MAX_FETCH_LIMIT, MIN_FETCH_LIMIT};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "BURSTWATCH_CONFIG";

/// Standard system location for the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/burstwatch/burstwatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl From<DetectError> for ConfigError {
    fn from(e: DetectError) -> Self {
        ConfigError::InvalidConfiguration(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "rules::defaults")]
    pub rules: Vec<AlertRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            classifier: ClassifierConfig::default(),
            scheduler: SchedulerConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            rules: rules::defaults(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Pick the config file to read, in order:
    /// 1. `explicit`, when given.
    /// 2. The path in the `BURSTWATCH_CONFIG` environment variable.
    /// 3. `/etc/burstwatch/burstwatch.toml`, if it exists.
    ///
    /// `None` means compiled-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(env_path));
        }
        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        system_path.exists().then(|| system_path.to_path_buf())
    }

    /// Load the file chosen by [`Config::locate`], or the defaults.
    ///
    /// A file that is found but invalid is an error, never silently skipped.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::locate(explicit) {
            Some(path) => Self::load(&path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject configurations that cannot run. Called before any scheduling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        rules::validate(&self.rules)?;

        if !(MIN_FETCH_LIMIT..=MAX_FETCH_LIMIT).contains(&self.feed.log_limit) {
            return Err(invalid(format!(
                "feed.log_limit must be between {} and {}, got {}",
                MIN_FETCH_LIMIT, MAX_FETCH_LIMIT, self.feed.log_limit
            )));
        }
        if self.feed.search_url.trim().is_empty() {
            return Err(invalid("feed.search_url is empty"));
        }
        if self.classifier.predict_url.trim().is_empty() {
            return Err(invalid("classifier.predict_url is empty"));
        }
        if self.classifier.concurrency == 0 {
            return Err(invalid("classifier.concurrency must be at least 1"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(invalid("scheduler.interval_secs must be at least 1"));
        }
        if self.notifications.kind == NotifierKind::Webhook
            && self
                .notifications
                .webhook_url
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
        {
            return Err(invalid("notifications.kind = \"webhook\" requires webhook_url"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfiguration(msg.into())
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Log store search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Elasticsearch `_search` URL of the Graylog index set.
    pub search_url: String,
    /// Entries fetched per refresh (1..=1000).
    pub log_limit: usize,
    pub timeout_secs: u64,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            search_url: "http://127.0.0.1:9200/graylog_*/_search".to_string(),
            log_limit: 150,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub predict_url: String,
    /// Maximum classification requests in flight per batch.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            predict_url: "http://127.0.0.1:5000/api/prediccion".to_string(),
            concurrency: 16,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    /// Whether auto-refresh starts armed.
    pub enabled: bool,
    /// Refresh runs kept in history.
    pub history_len: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            enabled: true,
            history_len: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    None,
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub kind: NotifierKind,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging / server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AlertType, Severity};
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.feed.log_limit, 150);
        assert_eq!(cfg.feed.search_url, "http://127.0.0.1:9200/graylog_*/_search");
        assert_eq!(cfg.classifier.predict_url, "http://127.0.0.1:5000/api/prediccion");
        assert_eq!(cfg.classifier.concurrency, 16);
        assert_eq!(cfg.scheduler.interval_secs, 600);
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.notifications.kind, NotifierKind::Log);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.rules.len(), 5);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[feed]
search_url = "http://172.55.1.7:9200/graylog_*/_search"
log_limit = 500

[classifier]
predict_url = "http://10.0.0.2:5000/api/prediccion"
concurrency = 4

[scheduler]
interval_secs = 120
enabled = false

[notifications]
kind = "webhook"
webhook_url = "http://hooks.local/alerts"

[logging]
level = "debug"
json = true

[[rules]]
rule_type = "suspicious_activity"
watched_classification = "port_scan"
threshold = 20
window_seconds = 30
severity = "critical"
title_template = "Port scan from {ip}"
message_template = "{count} probes in {timeWindow} seconds from {ip}"
"#;
        let cfg = Config::from_toml(toml_str).unwrap();
        assert_eq!(cfg.feed.log_limit, 500);
        assert_eq!(cfg.feed.timeout_secs, 10);
        assert_eq!(cfg.classifier.concurrency, 4);
        assert_eq!(cfg.scheduler.interval_secs, 120);
        assert!(!cfg.scheduler.enabled);
        assert_eq!(cfg.notifications.kind, NotifierKind::Webhook);
        assert!(cfg.logging.json);
        assert_eq!(cfg.rules.len(), 1);
        assert_eq!(cfg.rules[0].rule_type, AlertType::SuspiciousActivity);
        assert_eq!(cfg.rules[0].severity, Severity::Critical);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = Config::from_toml("[scheduler]\ninterval_secs = 30\n").unwrap();
        assert_eq!(cfg.scheduler.interval_secs, 30);
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.rules.len(), 5);
        assert_eq!(cfg.feed.log_limit, 150);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for bad in [
            "[feed]\nlog_limit = 0\n",
            "[feed]\nlog_limit = 1001\n",
            "[scheduler]\ninterval_secs = 0\n",
            "[classifier]\nconcurrency = 0\n",
            "[notifications]\nkind = \"webhook\"\n",
            "rules = []\n",
        ] {
            assert!(
                matches!(Config::from_toml(bad), Err(ConfigError::InvalidConfiguration(_))),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let toml_str = r#"
[[rules]]
rule_type = "login_failed_burst"
watched_classification = "login_failed"
threshold = 0
window_seconds = 60
severity = "high"
title_template = "x"
message_template = "y"
"#;
        let err = Config::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_oversized_window_is_rejected_at_load() {
        let toml_str = r#"
[[rules]]
rule_type = "login_failed_burst"
watched_classification = "login_failed"
threshold = 5
window_seconds = 10000000000000
severity = "high"
title_template = "x"
message_template = "y"
"#;
        let err = Config::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("window_seconds exceeds one year"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Path::new("/tmp/explicit-burstwatch.toml");
        assert_eq!(Config::locate(Some(path)), Some(path.to_path_buf()));
        assert!(matches!(
            Config::resolve(Some(Path::new("/nonexistent/burstwatch.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            Config::from_toml("[feed\nlog_limit = "),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ninterval_secs = 45").unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.scheduler.interval_secs, 45);

        let missing = Config::load(Path::new("/nonexistent/burstwatch.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
