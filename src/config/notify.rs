//! Notification configuration.
//!
//! Lives under `[notify]` in `config.toml`:
//!
//! ```toml
//! [notify]
//! interval_secs = 300
//! subject_prefix = "[jserrorlog] "
//! transport = "smtp"
//! recipients = [{ name = "Admin", address = "admin@example.com" }]
//!
//! [notify.smtp]
//! host = "smtp.example.com"
//! port = 587
//! username = "jserrorlog"
//! password = "${SMTP_PASSWORD}"
//! from = "jserrorlog@example.com"
//!
//! [notify.webhook]
//! url = "https://hooks.example.com/jserrorlog"
//! secret = "${WEBHOOK_SECRET}"
//! ```

use crate::{Error, Result};
use lettre::message::Mailbox;
use lettre::Address;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default throttle window between notifications for one fingerprint.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(300);

/// Longest accepted throttle window (ten years).
///
/// Keeps `now + interval` representable as an `Instant` on every platform
/// and well inside the millisecond range of Redis `PX`.
pub const MAX_NOTIFY_INTERVAL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default subject prefix.
pub const DEFAULT_SUBJECT_PREFIX: &str = "[jserrorlog] ";

/// Person notified about new errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRecipient {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address.
    pub address: String,
}

impl NotifyRecipient {
    /// Creates a recipient.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Builds the `Name <address>` mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the address does not parse.
    pub fn mailbox(&self) -> Result<Mailbox> {
        let address: Address = self.address.parse().map_err(|e| {
            Error::InvalidInput(format!("invalid recipient address '{}': {e}", self.address))
        })?;
        let name = (!self.name.is_empty()).then(|| self.name.clone());
        Ok(Mailbox::new(name, address))
    }
}

/// Notification transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Email via SMTP.
    Smtp,
    /// JSON POST to an HTTP endpoint.
    Webhook,
    /// `tracing` event only.
    #[default]
    Log,
}

impl TransportKind {
    /// Parses a transport name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "smtp" | "email" => Ok(Self::Smtp),
            "webhook" | "http" => Ok(Self::Webhook),
            "log" => Ok(Self::Log),
            other => Err(Error::InvalidInput(format!(
                "unknown notify transport '{other}' (expected smtp, webhook or log)"
            ))),
        }
    }

    /// Returns the transport name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Webhook => "webhook",
            Self::Log => "log",
        }
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Relay host.
    pub host: Option<String>,
    /// Relay port.
    pub port: u16,
    /// Login user, if the relay requires authentication.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<SecretString>,
    /// Sender address.
    pub from: Option<String>,
    /// Upgrade the connection with STARTTLS.
    pub starttls: bool,
    /// Connection and command timeout.
    pub timeout: Duration,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: None,
            starttls: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Webhook transport settings.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Endpoint receiving the JSON POST.
    pub url: Option<String>,
    /// HMAC-SHA256 signing secret.
    pub secret: Option<SecretString>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Throttle window per fingerprint.
    pub interval: Duration,
    /// Prepended to every rendered subject.
    pub subject_prefix: String,
    /// Selected transport.
    pub transport: TransportKind,
    /// Who gets notified.
    pub recipients: Vec<NotifyRecipient>,
    /// Subject template override.
    pub subject_template: Option<PathBuf>,
    /// Body template override.
    pub body_template: Option<PathBuf>,
    /// SMTP settings.
    pub smtp: SmtpSettings,
    /// Webhook settings.
    pub webhook: WebhookSettings,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_NOTIFY_INTERVAL,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            transport: TransportKind::default(),
            recipients: Vec::new(),
            subject_template: None,
            body_template: None,
            smtp: SmtpSettings::default(),
            webhook: WebhookSettings::default(),
        }
    }
}

impl NotifyConfig {
    /// Validates the settings required by the selected transport.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidInput(
                "notify.interval_secs must be > 0".to_string(),
            ));
        }
        if self.interval > MAX_NOTIFY_INTERVAL {
            return Err(Error::InvalidInput(format!(
                "notify.interval_secs must be <= {}",
                MAX_NOTIFY_INTERVAL.as_secs()
            )));
        }

        for recipient in &self.recipients {
            recipient.mailbox()?;
        }

        match self.transport {
            TransportKind::Smtp => {
                if self.smtp.host.as_deref().is_none_or(str::is_empty) {
                    return Err(Error::InvalidInput(
                        "notify.smtp.host is required for the smtp transport".to_string(),
                    ));
                }
                let from = self.smtp.from.as_deref().unwrap_or_default();
                from.parse::<Mailbox>().map_err(|e| {
                    Error::InvalidInput(format!("invalid notify.smtp.from '{from}': {e}"))
                })?;
            },
            TransportKind::Webhook => {
                let raw = self.webhook.url.as_deref().unwrap_or_default();
                let parsed = url::Url::parse(raw).map_err(|e| {
                    Error::InvalidInput(format!("invalid notify.webhook.url '{raw}': {e}"))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(Error::InvalidInput(format!(
                        "notify.webhook.url must be http(s): {raw}"
                    )));
                }
            },
            TransportKind::Log => {},
        }

        Ok(())
    }
}
