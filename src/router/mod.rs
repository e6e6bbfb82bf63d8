//! Event router.
//!
//! Fans an accepted [`ErrorReport`] out to every subscribed [`ReportHandler`].
//! The router is an explicitly constructed value: build it once at startup
//! and share it with the ingestion boundary.
//!
//! # Dispatch Semantics
//!
//! - Handlers run synchronously in registration order
//! - A failing or panicking handler never stops the remaining handlers
//! - All failures are returned together as an [`AggregateHandlerError`]

mod handlers;

pub use handlers::{NotifyHandler, PersistHandler};

use crate::config::JserrorlogConfig;
use crate::models::ErrorReport;
use crate::notify::NotificationDispatcher;
use crate::services::BackendFactory;
use crate::{Error, Result};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::instrument;

/// A unit of work triggered for every accepted report.
///
/// Handlers must not depend on each other's side effects.
pub trait ReportHandler: Send + Sync {
    /// Short handler name used in errors, logs and metrics.
    fn name(&self) -> &'static str;

    /// Processes one report.
    ///
    /// # Errors
    ///
    /// Any error is collected by the router and reported with the handler name.
    fn handle(&self, report: &ErrorReport) -> Result<()>;
}

/// One handler's failure during [`EventRouter::publish`].
#[derive(Debug)]
pub struct HandlerFailure {
    /// Name of the failing handler.
    pub handler: &'static str,
    /// What went wrong.
    pub error: Error,
}

/// Every handler failure from a single publish.
#[derive(Debug)]
pub struct AggregateHandlerError {
    failures: Vec<HandlerFailure>,
}

impl AggregateHandlerError {
    /// Returns the individual failures in dispatch order.
    #[must_use]
    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }

    /// Returns the names of the failed handlers.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.handler).collect()
    }

    /// Returns the failure for a handler, if it failed.
    #[must_use]
    pub fn get(&self, handler: &str) -> Option<&Error> {
        self.failures
            .iter()
            .find(|f| f.handler == handler)
            .map(|f| &f.error)
    }
}

impl fmt::Display for AggregateHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler(s) failed: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.handler, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateHandlerError {}

/// Explicit publish/subscribe hub for accepted reports.
#[derive(Default)]
pub struct EventRouter {
    handlers: Vec<Arc<dyn ReportHandler>>,
}

impl EventRouter {
    /// Creates a router with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a router with the standard handlers enabled by the configuration.
    ///
    /// The persist handler opens the `SQLite` store; the notify handler
    /// builds a dispatcher with the configured throttle backend and transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration does not validate,
    /// or an error if an enabled handler's backend cannot be set up.
    pub fn from_config(config: &JserrorlogConfig) -> Result<Self> {
        config.validate()?;
        let mut router = Self::new();

        if config.features.persist_enabled {
            let store = BackendFactory::create_error_store(&config.storage)?;
            router.subscribe(Arc::new(PersistHandler::new(store)));
        }
        if config.features.notify_enabled {
            let dispatcher = NotificationDispatcher::from_config(config)?;
            router.subscribe(Arc::new(NotifyHandler::new(Arc::new(dispatcher))));
        }

        tracing::debug!(handlers = ?router.handler_names(), "Event router ready");
        Ok(router)
    }

    /// Registers a handler invoked for every published report.
    pub fn subscribe(&mut self, handler: Arc<dyn ReportHandler>) {
        metrics::counter!("router_subscriptions_total", "handler" => handler.name()).increment(1);
        self.handlers.push(handler);
    }

    /// Returns the registered handler names in dispatch order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes every handler with the report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlersFailed`] listing each handler that failed.
    #[instrument(
        skip(self, report),
        fields(operation = "publish", url = %report.url, line = report.line, handlers = self.handlers.len())
    )]
    pub fn publish(&self, report: &ErrorReport) -> Result<()> {
        metrics::counter!("router_publish_total").increment(1);

        let mut failures = Vec::new();
        for handler in &self.handlers {
            let name = handler.name();
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(report)))
                .unwrap_or_else(|payload| {
                    Err(Error::OperationFailed {
                        operation: "handler_panic".to_string(),
                        cause: panic_message(payload.as_ref()),
                    })
                });

            if let Err(error) = result {
                metrics::counter!("router_handler_failures_total", "handler" => name).increment(1);
                tracing::warn!(handler = name, error = %error, "Report handler failed");
                failures.push(HandlerFailure {
                    handler: name,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateHandlerError { failures }.into())
        }
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
