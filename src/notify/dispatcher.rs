//! Throttled notification dispatcher.
//!
//! # Flow
//!
//! ```text
//! ErrorReport --> Fingerprinter --> ThrottleCache::check_and_mark
//!                                        |
//!                     throttled <--------+--------> marked / unavailable
//!                     (return)                          |
//!                                                       v
//!                                        NotificationRenderer (subject, body)
//!                                                       |
//!                                                       v
//!                                          NotificationDelivery::deliver
//! ```
//!
//! # Failure Policy
//!
//! - Throttle cache unavailable: warn and notify anyway (fail open)
//! - Render or delivery failure: returned to the caller, no retry
//! - The throttle entry is never rolled back, so a failed delivery still
//!   suppresses duplicates for the rest of the window

use super::context::{Notification, NotificationContext};
use super::delivery::NotificationDelivery;
use super::render::{NotificationRenderer, TemplateRenderer};
use crate::config::{DEFAULT_SUBJECT_PREFIX, JserrorlogConfig};
use crate::models::ErrorReport;
use crate::services::BackendFactory;
use crate::services::throttle::{Fingerprinter, ThrottleCache};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// What [`NotificationDispatcher::notify`] did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// A notification was rendered and handed to the transport.
    Delivered,
    /// An equivalent notification already went out within the window.
    Throttled,
}

impl NotifyOutcome {
    /// Returns the outcome label used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Throttled => "throttled",
        }
    }
}

/// Sends at most one notification per fingerprint per interval.
pub struct NotificationDispatcher {
    cache: Arc<dyn ThrottleCache>,
    renderer: Arc<dyn NotificationRenderer>,
    delivery: Arc<dyn NotificationDelivery>,
    interval: Duration,
    subject_prefix: String,
}

impl NotificationDispatcher {
    /// Creates a dispatcher with the default templates and subject prefix.
    #[must_use]
    pub fn new(
        cache: Arc<dyn ThrottleCache>,
        delivery: Arc<dyn NotificationDelivery>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            renderer: Arc::new(TemplateRenderer::new()),
            delivery,
            interval,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }

    /// Builds the dispatcher described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration does not
    /// validate, or an error if the throttle backend, templates or transport
    /// cannot be set up.
    pub fn from_config(config: &JserrorlogConfig) -> Result<Self> {
        config.validate()?;
        let cache = BackendFactory::create_throttle_cache(&config.throttle)?;
        let renderer = TemplateRenderer::from_config(&config.notify)?;
        let delivery = super::create_delivery(&config.notify)?;

        Ok(Self::new(cache, delivery, config.notify.interval)
            .with_renderer(Arc::new(renderer))
            .with_subject_prefix(config.notify.subject_prefix.clone()))
    }

    /// Replaces the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn NotificationRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the prefix prepended to every subject.
    #[must_use]
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// Returns the throttle window.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Notifies about a report unless an equivalent notification went out
    /// within the interval.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RenderFailed`] or [`crate::Error::DeliveryFailed`], or
    /// [`crate::Error::InvalidInput`] if the cache rejects the interval. An
    /// unreachable cache is not an error: the report is notified anyway.
    #[instrument(
        skip(self, report),
        fields(operation = "notify", url = %report.url, line = report.line)
    )]
    pub fn notify(&self, report: &ErrorReport) -> Result<NotifyOutcome> {
        let key = Fingerprinter::for_report(report);

        match self.cache.check_and_mark(&key, self.interval) {
            Ok(true) => {
                tracing::debug!(key = %key, "Notification throttled");
                Self::record_outcome(NotifyOutcome::Throttled.as_str());
                return Ok(NotifyOutcome::Throttled);
            },
            Ok(false) => {},
            Err(e) if e.is_cache_unavailable() => {
                metrics::counter!(
                    "throttle_fail_open_total",
                    "backend" => self.cache.backend_name()
                )
                .increment(1);
                tracing::warn!(
                    key = %key,
                    backend = self.cache.backend_name(),
                    error = %e,
                    "Throttle cache unavailable, notifying anyway"
                );
            },
            Err(e) => {
                Self::record_outcome("throttle_error");
                tracing::error!(key = %key, error = %e, "Throttle check rejected");
                return Err(e);
            },
        }

        let notification = self.render(report).inspect_err(|_| {
            Self::record_outcome("render_failed");
        })?;

        let transport = self.delivery.transport_name();
        let start = Instant::now();
        let result = self.delivery.deliver(&notification);
        metrics::histogram!(
            "notification_delivery_duration_ms",
            "transport" => transport
        )
        .record(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(()) => {
                Self::record_outcome(NotifyOutcome::Delivered.as_str());
                tracing::info!(
                    transport,
                    subject = %notification.subject,
                    "Error notification delivered"
                );
                Ok(NotifyOutcome::Delivered)
            },
            Err(e) => {
                Self::record_outcome("delivery_failed");
                tracing::error!(transport, error = %e, "Error notification delivery failed");
                Err(e)
            },
        }
    }

    fn render(&self, report: &ErrorReport) -> Result<Notification> {
        let ctx = NotificationContext::from_report(report);
        let subject = self.renderer.render_subject(&ctx)?;
        let body = self.renderer.render_body(&ctx)?;
        Ok(Notification::new(
            format!("{}{}", self.subject_prefix, subject.trim()),
            body,
        ))
    }

    fn record_outcome(outcome: &'static str) {
        metrics::counter!("notifications_total", "outcome" => outcome).increment(1);
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("backend", &self.cache.backend_name())
            .field("transport", &self.delivery.transport_name())
            .field("interval", &self.interval)
            .field("subject_prefix", &self.subject_prefix)
            .finish_non_exhaustive()
    }
}
