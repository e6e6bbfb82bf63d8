//! Configuration management.
//!
//! Configuration is static: it is read once at startup and never mutated
//! afterward. Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `config.toml` (`--config <path>` or the default location)
//! 3. `JSERRORLOG_*` environment variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `JSERRORLOG_NOTIFY_ENABLED` | `features.notify_enabled` |
//! | `JSERRORLOG_PERSIST_ENABLED` | `features.persist_enabled` |
//! | `JSERRORLOG_NOTIFY_INTERVAL_SECS` | `notify.interval_secs` |
//! | `JSERRORLOG_DATABASE` | `storage.database` |
//! | `JSERRORLOG_REDIS_URL` | `throttle.redis_url` |
//! | `JSERRORLOG_SMTP_PASSWORD` | `notify.smtp.password` |
//! | `JSERRORLOG_LOG_LEVEL` | `logging.level` |

mod features;
mod notify;

pub use features::FeatureFlags;
pub use notify::{
    DEFAULT_NOTIFY_INTERVAL, DEFAULT_SUBJECT_PREFIX, MAX_NOTIFY_INTERVAL, NotifyConfig,
    NotifyRecipient, SmtpSettings, TransportKind, WebhookSettings,
};

use crate::services::throttle::DEFAULT_CAPACITY;
use crate::{Error, Result};
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Main configuration for jserrorlog.
#[derive(Debug, Clone, Default)]
pub struct JserrorlogConfig {
    /// Handler switches.
    pub features: FeatureFlags,
    /// Notification settings.
    pub notify: NotifyConfig,
    /// Throttle backend settings.
    pub throttle: ThrottleConfig,
    /// Error store settings.
    pub storage: StorageConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// Throttle cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleBackendKind {
    /// Process-local LRU.
    #[default]
    Memory,
    /// Shared Redis instance (`redis` feature).
    Redis,
}

/// Throttle cache settings.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Backend type.
    pub backend: ThrottleBackendKind,
    /// Maximum tracked fingerprints (memory backend).
    pub capacity: usize,
    /// Redis connection URL (redis backend).
    pub redis_url: Option<String>,
    /// Backend round-trip timeout.
    pub timeout: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            backend: ThrottleBackendKind::Memory,
            capacity: DEFAULT_CAPACITY,
            redis_url: None,
            timeout: Duration::from_millis(500),
        }
    }
}

/// Error store settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `SQLite` database file.
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("jserrorlog.db"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    /// Install the exporter.
    pub enabled: bool,
    /// HTTP listener port.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Feature flags.
    pub features: Option<ConfigFileFeatures>,
    /// Notification settings.
    pub notify: Option<ConfigFileNotify>,
    /// Throttle settings.
    pub throttle: Option<ConfigFileThrottle>,
    /// Storage settings.
    pub storage: Option<ConfigFileStorage>,
    /// Logging settings.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics settings.
    pub metrics: Option<ConfigFileMetrics>,
}

/// `[features]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileFeatures {
    /// Notify handler.
    pub notify_enabled: Option<bool>,
    /// Persist handler.
    pub persist_enabled: Option<bool>,
}

/// `[notify]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileNotify {
    /// Throttle window in seconds.
    pub interval_secs: Option<u64>,
    /// Subject prefix.
    pub subject_prefix: Option<String>,
    /// Transport name.
    pub transport: Option<String>,
    /// Recipients.
    pub recipients: Option<Vec<NotifyRecipient>>,
    /// Subject template path.
    pub subject_template: Option<String>,
    /// Body template path.
    pub body_template: Option<String>,
    /// `[notify.smtp]` section.
    pub smtp: Option<ConfigFileSmtp>,
    /// `[notify.webhook]` section.
    pub webhook: Option<ConfigFileWebhook>,
}

/// `[notify.smtp]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSmtp {
    /// Relay host.
    pub host: Option<String>,
    /// Relay port.
    pub port: Option<u16>,
    /// Login user.
    pub username: Option<String>,
    /// Login password (supports `${VAR}`).
    pub password: Option<String>,
    /// Sender address.
    pub from: Option<String>,
    /// STARTTLS.
    pub starttls: Option<bool>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// `[notify.webhook]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWebhook {
    /// Endpoint URL.
    pub url: Option<String>,
    /// Signing secret (supports `${VAR}`).
    pub secret: Option<String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// `[throttle]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileThrottle {
    /// `memory` or `redis`.
    pub backend: Option<String>,
    /// Memory backend capacity.
    pub capacity: Option<usize>,
    /// Redis URL (supports `${VAR}`).
    pub redis_url: Option<String>,
    /// Backend timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Database path.
    pub database: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMetrics {
    /// Install the exporter.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

impl JserrorlogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown transport or backend.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_toml_str(&contents).map(Self::with_env_overrides)
    }

    /// Parses TOML configuration without consulting the environment,
    /// except for `${VAR}` references in secret fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or names an unknown
    /// transport or backend.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file, &|name| std::env::var(name).ok())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/jserrorlog/` on macOS)
    /// 2. XDG config dir (`~/.config/jserrorlog/` for Unix compatibility)
    ///
    /// Returns defaults (with environment overrides) if no usable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let platform_config = base_dirs.config_dir().join("jserrorlog").join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("jserrorlog")
            .join("config.toml");

        for candidate in [platform_config, xdg_config] {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default().with_env_overrides()
    }

    /// Applies `JSERRORLOG_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(&|name| std::env::var(name).ok());
        self
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = env_bool(lookup, "JSERRORLOG_NOTIFY_ENABLED") {
            self.features.notify_enabled = v;
        }
        if let Some(v) = env_bool(lookup, "JSERRORLOG_PERSIST_ENABLED") {
            self.features.persist_enabled = v;
        }
        if let Some(raw) = lookup("JSERRORLOG_NOTIFY_INTERVAL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.notify.interval = Duration::from_secs(secs),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid JSERRORLOG_NOTIFY_INTERVAL_SECS");
                },
            }
        }
        if let Some(path) = lookup("JSERRORLOG_DATABASE").filter(|v| !v.is_empty()) {
            self.storage.database = PathBuf::from(path);
        }
        if let Some(url) = lookup("JSERRORLOG_REDIS_URL").filter(|v| !v.is_empty()) {
            self.throttle.redis_url = Some(url);
        }
        if let Some(password) = lookup("JSERRORLOG_SMTP_PASSWORD").filter(|v| !v.is_empty()) {
            self.notify.smtp.password = Some(SecretString::from(password));
        }
        if let Some(level) = lookup("JSERRORLOG_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.throttle.capacity == 0 {
            return Err(Error::InvalidInput(
                "throttle.capacity must be > 0".to_string(),
            ));
        }

        if self.throttle.backend == ThrottleBackendKind::Redis {
            if !cfg!(feature = "redis") {
                return Err(Error::InvalidInput(
                    "throttle.backend = \"redis\" requires the `redis` feature".to_string(),
                ));
            }
            if self.throttle.redis_url.as_deref().is_none_or(str::is_empty) {
                return Err(Error::InvalidInput(
                    "throttle.redis_url is required for the redis backend".to_string(),
                ));
            }
        }

        if self.features.notify_enabled {
            self.notify.validate()?;
        }

        Ok(())
    }

    /// Sets the feature flags.
    #[must_use]
    pub const fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.database = path.into();
        self
    }

    /// Converts a `ConfigFile`, expanding `${VAR}` references with `lookup`.
    fn from_config_file(file: ConfigFile, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(features) = file.features {
            if let Some(v) = features.notify_enabled {
                config.features.notify_enabled = v;
            }
            if let Some(v) = features.persist_enabled {
                config.features.persist_enabled = v;
            }
        }

        if let Some(notify) = file.notify {
            Self::merge_notify(&mut config.notify, notify, lookup)?;
        }

        if let Some(throttle) = file.throttle {
            if let Some(backend) = throttle.backend {
                config.throttle.backend = match backend.trim().to_lowercase().as_str() {
                    "memory" => ThrottleBackendKind::Memory,
                    "redis" => ThrottleBackendKind::Redis,
                    other => {
                        return Err(Error::InvalidInput(format!(
                            "unknown throttle backend '{other}' (expected memory or redis)"
                        )));
                    },
                };
            }
            if let Some(capacity) = throttle.capacity {
                config.throttle.capacity = capacity;
            }
            config.throttle.redis_url = throttle.redis_url.map(|url| expand_env_vars(&url, lookup));
            if let Some(ms) = throttle.timeout_ms {
                config.throttle.timeout = Duration::from_millis(ms);
            }
        }

        if let Some(database) = file.storage.and_then(|s| s.database) {
            config.storage.database = PathBuf::from(database);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = match format.trim().to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                };
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        if let Some(metrics) = file.metrics {
            if let Some(enabled) = metrics.enabled {
                config.metrics.enabled = enabled;
            }
            if let Some(port) = metrics.port {
                config.metrics.port = port;
            }
        }

        Ok(config)
    }

    fn merge_notify(
        target: &mut NotifyConfig,
        file: ConfigFileNotify,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(secs) = file.interval_secs {
            target.interval = Duration::from_secs(secs);
        }
        if let Some(prefix) = file.subject_prefix {
            target.subject_prefix = prefix;
        }
        if let Some(transport) = file.transport {
            target.transport = TransportKind::parse(&transport)?;
        }
        if let Some(recipients) = file.recipients {
            target.recipients = recipients;
        }
        target.subject_template = file.subject_template.map(PathBuf::from);
        target.body_template = file.body_template.map(PathBuf::from);

        if let Some(smtp) = file.smtp {
            target.smtp.host = smtp.host;
            if let Some(port) = smtp.port {
                target.smtp.port = port;
            }
            target.smtp.username = smtp.username;
            target.smtp.password = smtp
                .password
                .map(|p| SecretString::from(expand_env_vars(&p, lookup)));
            target.smtp.from = smtp.from;
            if let Some(starttls) = smtp.starttls {
                target.smtp.starttls = starttls;
            }
            if let Some(secs) = smtp.timeout_secs {
                target.smtp.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(webhook) = file.webhook {
            target.webhook.url = webhook.url;
            target.webhook.secret = webhook
                .secret
                .map(|s| SecretString::from(expand_env_vars(&s, lookup)));
            if let Some(secs) = webhook.timeout_secs {
                target.webhook.timeout = Duration::from_secs(secs);
            }
        }

        Ok(())
    }
}

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap_or_else(|_| unreachable!())
});

/// Replaces `${VAR}` references. Unset variables expand to an empty string.
fn expand_env_vars(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    ENV_REFERENCE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn env_bool(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let value = lookup(name)?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(name, value = %value, "Ignoring invalid boolean override");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn parse(contents: &str, vars: &[(&str, &str)]) -> Result<JserrorlogConfig> {
        let file: ConfigFile = toml::from_str(contents).expect("valid toml");
        JserrorlogConfig::from_config_file(file, &lookup_from(vars))
    }

    #[test]
    fn test_defaults() {
        let config = JserrorlogConfig::new();
        assert!(config.features.notify_enabled);
        assert!(config.features.persist_enabled);
        assert_eq!(config.notify.interval, Duration::from_secs(300));
        assert_eq!(config.notify.transport, TransportKind::Log);
        assert_eq!(config.throttle.capacity, DEFAULT_CAPACITY);
        assert!(!config.metrics.enabled);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_full_file() {
        let config = parse(
            r#"
            [features]
            notify_enabled = true
            persist_enabled = false

            [notify]
            interval_secs = 60
            subject_prefix = "[site] "
            transport = "smtp"
            recipients = [{ name = "Admin", address = "admin@example.com" }]

            [notify.smtp]
            host = "smtp.example.com"
            port = 2525
            username = "jserrorlog"
            password = "${SMTP_PASSWORD}"
            from = "jserrorlog@example.com"
            starttls = false

            [throttle]
            capacity = 64

            [storage]
            database = "/var/lib/jserrorlog/errors.db"

            [logging]
            level = "debug"
            format = "json"

            [metrics]
            enabled = true
            port = 9100
            "#,
            &[("SMTP_PASSWORD", "hunter2")],
        )
        .expect("parse config");

        assert!(!config.features.persist_enabled);
        assert_eq!(config.notify.interval, Duration::from_secs(60));
        assert_eq!(config.notify.subject_prefix, "[site] ");
        assert_eq!(config.notify.transport, TransportKind::Smtp);
        assert_eq!(config.notify.recipients.len(), 1);
        assert_eq!(config.notify.smtp.port, 2525);
        assert!(!config.notify.smtp.starttls);
        assert_eq!(
            config
                .notify
                .smtp
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string()),
            Some("hunter2".to_string())
        );
        assert_eq!(config.throttle.capacity, 64);
        assert_eq!(
            config.storage.database,
            PathBuf::from("/var/lib/jserrorlog/errors.db")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.metrics.port, 9100);
        config.validate().expect("valid config");
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let result = parse("[notify]\ntransport = \"fax\"\n", &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = parse("[throttle]\nbackend = \"memcached\"\n", &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = JserrorlogConfig::default();
        config.apply_overrides(&lookup_from(&[
            ("JSERRORLOG_NOTIFY_ENABLED", "false"),
            ("JSERRORLOG_PERSIST_ENABLED", "0"),
            ("JSERRORLOG_NOTIFY_INTERVAL_SECS", "42"),
            ("JSERRORLOG_DATABASE", "/tmp/errors.db"),
            ("JSERRORLOG_LOG_LEVEL", "trace"),
        ]));

        assert_eq!(config.features, FeatureFlags::none());
        assert_eq!(config.notify.interval, Duration::from_secs(42));
        assert_eq!(config.storage.database, PathBuf::from("/tmp/errors.db"));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_invalid_env_overrides_ignored() {
        let mut config = JserrorlogConfig::default();
        config.apply_overrides(&lookup_from(&[
            ("JSERRORLOG_NOTIFY_ENABLED", "maybe"),
            ("JSERRORLOG_NOTIFY_INTERVAL_SECS", "soon"),
        ]));

        assert!(config.features.notify_enabled);
        assert_eq!(config.notify.interval, DEFAULT_NOTIFY_INTERVAL);
    }

    #[test]
    fn test_expand_env_vars() {
        let lookup = lookup_from(&[("A", "1")]);
        assert_eq!(expand_env_vars("x${A}y${MISSING}z", &lookup), "x1yz");
        assert_eq!(expand_env_vars("plain", &lookup), "plain");
    }

    #[test]
    fn test_validate_capacity() {
        let mut config = JserrorlogConfig::default();
        config.throttle.capacity = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_redis_requires_url() {
        let mut config = JserrorlogConfig::default();
        config.throttle.backend = ThrottleBackendKind::Redis;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_notify_checks_skipped_when_disabled() {
        let mut config = JserrorlogConfig::default().with_features(FeatureFlags {
            notify_enabled: false,
            persist_enabled: true,
        });
        config.notify.transport = TransportKind::Smtp;
        config.notify.interval = Duration::ZERO;
        config.validate().expect("notify settings unused when notify is off");
    }

    #[test]
    fn test_validate_rejects_out_of_range_interval() {
        let mut config = JserrorlogConfig::default();
        config.notify.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));

        config.notify.interval = Duration::from_secs(u64::MAX);
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));

        config.notify.interval = MAX_NOTIFY_INTERVAL;
        config.validate().expect("upper bound is inclusive");
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = JserrorlogConfig::load_from_file(Path::new("/nonexistent/jserrorlog.toml"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
