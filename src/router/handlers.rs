//! Standard report handlers.

use super::ReportHandler;
use crate::Result;
use crate::models::ErrorReport;
use crate::notify::NotificationDispatcher;
use crate::storage::ErrorStore;
use std::sync::Arc;

/// Writes every accepted report to the error store.
pub struct PersistHandler {
    store: Arc<dyn ErrorStore>,
}

impl PersistHandler {
    /// Creates a handler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ErrorStore>) -> Self {
        Self { store }
    }
}

impl ReportHandler for PersistHandler {
    fn name(&self) -> &'static str {
        "persist"
    }

    fn handle(&self, report: &ErrorReport) -> Result<()> {
        let id = self.store.store(report)?;
        tracing::debug!(report_id = %id, backend = self.store.backend_name(), "Report persisted");
        Ok(())
    }
}

/// Passes every accepted report to the notification dispatcher.
pub struct NotifyHandler {
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotifyHandler {
    /// Creates a handler notifying through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl ReportHandler for NotifyHandler {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn handle(&self, report: &ErrorReport) -> Result<()> {
        self.dispatcher.notify(report).map(|_| ())
    }
}
