//! In-process error store.

use crate::models::{BrowserFamily, ErrorReport, ReportId};
use crate::storage::sqlite::{acquire_lock, record_operation_metrics};
use crate::storage::traits::{ErrorStore, StoredReport};
use crate::Result;
use std::sync::Mutex;
use std::time::Instant;

/// Error store that keeps reports in memory.
///
/// Used by `ingest --dry-run` and tests. IDs start at 1 and increase
/// monotonically, like `SQLite` row IDs.
#[derive(Default)]
pub struct MemoryErrorStore {
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryErrorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every stored report in insertion order.
    #[must_use]
    pub fn reports(&self) -> Vec<StoredReport> {
        acquire_lock(&self.reports).clone()
    }
}

impl ErrorStore for MemoryErrorStore {
    fn store(&self, report: &ErrorReport) -> Result<ReportId> {
        let start = Instant::now();
        let mut reports = acquire_lock(&self.reports);
        let id = ReportId::new(i64::try_from(reports.len()).unwrap_or(i64::MAX - 1) + 1);
        reports.push(StoredReport {
            id,
            report: report.clone(),
            browser: BrowserFamily::from_user_agent(&report.user_agent),
        });
        drop(reports);

        record_operation_metrics("memory", "store", start, "success");
        Ok(id)
    }

    fn get(&self, id: ReportId) -> Result<Option<StoredReport>> {
        let reports = acquire_lock(&self.reports);
        Ok(reports.iter().find(|stored| stored.id == id).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(acquire_lock(&self.reports).len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let store = MemoryErrorStore::new();
        let first = store.store(&ErrorReport::new("p", "u", "a", 1)).expect("store");
        let second = store.store(&ErrorReport::new("p", "u", "b", 2)).expect("store");

        assert_eq!(first.as_i64(), 1);
        assert_eq!(second.as_i64(), 2);
        assert_eq!(store.count().expect("count"), 2);
        assert_eq!(
            store.get(second).expect("get").map(|s| s.report.message),
            Some("b".to_string())
        );
        assert!(store.get(ReportId::new(3)).expect("get").is_none());
    }

    #[test]
    fn test_reports_snapshot() {
        let store = MemoryErrorStore::new();
        store.store(&ErrorReport::new("p", "u", "m", 1)).expect("store");
        let snapshot = store.reports();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].browser, BrowserFamily::Other);
    }
}
