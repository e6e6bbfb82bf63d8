//! Rate-limited error notifications.
//!
//! The [`NotificationDispatcher`] decides per report whether a notification
//! goes out, renders it through a [`NotificationRenderer`] and hands it to a
//! [`NotificationDelivery`] transport.

mod context;
mod delivery;
mod dispatcher;
mod render;

pub use context::{Notification, NotificationContext};
pub use delivery::{
    LogDelivery, NotificationDelivery, SmtpDelivery, WebhookDelivery, compute_signature,
};
pub use dispatcher::{NotificationDispatcher, NotifyOutcome};
pub use render::{
    DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE, NotificationRenderer, TemplateRenderer,
};

use crate::Result;
use crate::config::{NotifyConfig, TransportKind};
use std::sync::Arc;

/// Creates the configured transport.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the transport's settings are incomplete.
pub fn create_delivery(config: &NotifyConfig) -> Result<Arc<dyn NotificationDelivery>> {
    let delivery: Arc<dyn NotificationDelivery> = match config.transport {
        TransportKind::Smtp => Arc::new(SmtpDelivery::new(&config.smtp, &config.recipients)?),
        TransportKind::Webhook => {
            Arc::new(WebhookDelivery::new(&config.webhook, &config.recipients)?)
        },
        TransportKind::Log => Arc::new(LogDelivery),
    };
    tracing::debug!(transport = delivery.transport_name(), "Notification transport ready");
    Ok(delivery)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_log_delivery() {
        let delivery = create_delivery(&NotifyConfig::default()).expect("log transport");
        assert_eq!(delivery.transport_name(), "log");
    }

    #[test]
    fn test_create_smtp_requires_host() {
        let config = NotifyConfig {
            transport: TransportKind::Smtp,
            ..NotifyConfig::default()
        };
        assert!(create_delivery(&config).is_err());
    }
}
