//! Error store trait.

use crate::models::{BrowserFamily, ErrorReport, ReportId};
use crate::Result;

/// A persisted error report together with the fields derived at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    /// Row identifier.
    pub id: ReportId,
    /// The report as submitted.
    pub report: ErrorReport,
    /// Browser family classified from the user agent.
    pub browser: BrowserFamily,
}

/// Persistence collaborator for accepted error reports.
///
/// Stores are shared between request threads behind an `Arc`, so every
/// method takes `&self`.
pub trait ErrorStore: Send + Sync {
    /// Persists a report, including its meta mapping, and returns its new ID.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreFailed`] if the write fails.
    fn store(&self, report: &ErrorReport) -> Result<ReportId>;

    /// Retrieves a stored report by ID.
    fn get(&self, id: ReportId) -> Result<Option<StoredReport>>;

    /// Returns the number of stored reports.
    fn count(&self) -> Result<usize>;

    /// Short backend name used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}
