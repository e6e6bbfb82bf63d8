//! `SQLite`-backed error store.

use crate::models::{BrowserFamily, ErrorReport, LoadPhase, ReportId, ReportMeta};
use crate::storage::sqlite::{acquire_lock, configure_connection, record_operation_metrics};
use crate::storage::traits::{ErrorStore, StoredReport};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-based error store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. WAL mode and a 5 second
/// `busy_timeout` keep concurrent ingestion from failing with `SQLITE_BUSY`.
///
/// # Schema
///
/// One `error_logs` table holding the report fields, the classified browser
/// family, the meta mapping as JSON text (empty string when there is none),
/// and `created_at` as Unix seconds.
pub struct SqliteErrorStore {
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

const SELECT_COLUMNS: &str = "id, page, url, message, line, when_phase, user_agent, browser, \
                              meta, created_at, user_id, session_key, remote_addr";

impl SqliteErrorStore {
    /// Opens (creating if needed) the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS error_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page TEXT NOT NULL,
                url TEXT NOT NULL,
                message TEXT NOT NULL,
                line INTEGER NOT NULL,
                when_phase TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                browser TEXT NOT NULL,
                meta TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                user_id TEXT,
                session_key TEXT NOT NULL DEFAULT '',
                remote_addr TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_error_logs_url_line ON error_logs (url, line);
            CREATE INDEX IF NOT EXISTS idx_error_logs_created_at ON error_logs (created_at);",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_error_logs_table".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    fn insert(&self, report: &ErrorReport) -> Result<ReportId> {
        let browser = BrowserFamily::from_user_agent(&report.user_agent);
        let conn = acquire_lock(&self.conn);

        conn.execute(
            "INSERT INTO error_logs (page, url, message, line, when_phase, user_agent, browser,
                                     meta, created_at, user_id, session_key, remote_addr)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                report.page,
                report.url,
                report.message,
                report.line,
                report.when.as_str(),
                report.user_agent,
                browser.as_str(),
                report.meta.to_json(),
                report.created_at.timestamp(),
                report.user_id,
                report.session_key,
                report.remote_addr,
            ],
        )
        .map_err(|e| Error::StoreFailed {
            cause: e.to_string(),
        })?;

        Ok(ReportId::new(conn.last_insert_rowid()))
    }

    fn select(&self, id: ReportId) -> Result<Option<StoredReport>> {
        let conn = acquire_lock(&self.conn);
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM error_logs WHERE id = ?1"),
                params![id.as_i64()],
                ReportRow::from_row,
            )
            .optional()
            .map_err(|e| Error::OperationFailed {
                operation: "get_error_log".to_string(),
                cause: e.to_string(),
            })?;

        row.map(ReportRow::into_stored).transpose()
    }
}

/// Raw column values of one `error_logs` row.
struct ReportRow {
    id: i64,
    page: String,
    url: String,
    message: String,
    line: u32,
    when_phase: String,
    user_agent: String,
    browser: String,
    meta: String,
    created_at: i64,
    user_id: Option<String>,
    session_key: String,
    remote_addr: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            page: row.get(1)?,
            url: row.get(2)?,
            message: row.get(3)?,
            line: row.get(4)?,
            when_phase: row.get(5)?,
            user_agent: row.get(6)?,
            browser: row.get(7)?,
            meta: row.get(8)?,
            created_at: row.get(9)?,
            user_id: row.get(10)?,
            session_key: row.get(11)?,
            remote_addr: row.get(12)?,
        })
    }

    fn into_stored(self) -> Result<StoredReport> {
        let meta = if self.meta.is_empty() {
            ReportMeta::new()
        } else {
            serde_json::from_str(&self.meta).map_err(|e| Error::OperationFailed {
                operation: "decode_error_log_meta".to_string(),
                cause: e.to_string(),
            })?
        };
        let created_at = DateTime::<Utc>::from_timestamp(self.created_at, 0).ok_or_else(|| {
            Error::OperationFailed {
                operation: "decode_error_log_created_at".to_string(),
                cause: format!("timestamp {} out of range", self.created_at),
            }
        })?;

        // classified at write time; the stored name is authoritative
        let browser = BrowserFamily::from_name(&self.browser);

        Ok(StoredReport {
            id: ReportId::new(self.id),
            report: ErrorReport {
                page: self.page,
                url: self.url,
                message: self.message,
                line: self.line,
                when: LoadPhase::parse(&self.when_phase),
                user_agent: self.user_agent,
                meta,
                created_at,
                user_id: self.user_id,
                session_key: self.session_key,
                remote_addr: self.remote_addr,
            },
            browser,
        })
    }
}

impl ErrorStore for SqliteErrorStore {
    #[instrument(skip(self, report), fields(operation = "store", backend = "sqlite", url = %report.url, line = report.line))]
    fn store(&self, report: &ErrorReport) -> Result<ReportId> {
        let start = Instant::now();
        let result = self.insert(report);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "store", start, status);

        if let Ok(id) = &result {
            tracing::debug!(report_id = %id, "Stored error report");
        }
        result
    }

    fn get(&self, id: ReportId) -> Result<Option<StoredReport>> {
        let start = Instant::now();
        let result = self.select(id);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "get", start, status);
        result
    }

    fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM error_logs", [], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "count_error_logs".to_string(),
                cause: e.to_string(),
            })?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 5.1) AppleWebKit/537.4 \
                             (KHTML, like Gecko) Chrome/22.0.1229.92 Safari/537.4";

    fn sample_report() -> ErrorReport {
        ErrorReport::new(
            "http://localhost/?test=key",
            "http://localhost/static/app.js",
            "Uncaught ReferenceError: aaa is not defined",
            87,
        )
        .with_when(LoadPhase::Before)
        .with_user_agent(CHROME_UA)
        .with_user_id("1")
        .with_session_key("dummy_session_key")
        .with_remote_addr("127.0.0.1")
        .with_created_at(Utc.with_ymd_and_hms(2012, 12, 17, 10, 20, 0).unwrap())
    }

    #[test]
    fn test_store_and_get() {
        let store = SqliteErrorStore::in_memory().expect("open store");
        let report = sample_report().with_meta(ReportMeta::from_pairs([("meta", "dummy")]));

        let id = store.store(&report).expect("store");
        let stored = store.get(id).expect("get").expect("row exists");

        assert_eq!(stored.id, id);
        assert_eq!(stored.report, report);
        assert_eq!(stored.browser, BrowserFamily::Chrome);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn test_meta_column_encoding() {
        let store = SqliteErrorStore::in_memory().expect("open store");
        let without = store.store(&sample_report()).expect("store");
        let with = store
            .store(&sample_report().with_meta(ReportMeta::from_pairs([("meta", "dummy")])))
            .expect("store");

        let conn = acquire_lock(&store.conn);
        let raw = |id: ReportId| -> String {
            conn.query_row(
                "SELECT meta FROM error_logs WHERE id = ?1",
                params![id.as_i64()],
                |row| row.get(0),
            )
            .expect("meta column")
        };
        assert_eq!(raw(without), "");
        assert_eq!(raw(with), r#"{"meta":"dummy"}"#);
    }

    #[test]
    fn test_anonymous_user_is_null() {
        let store = SqliteErrorStore::in_memory().expect("open store");
        let report = ErrorReport::new("p", "u", "m", 1);
        let id = store.store(&report).expect("store");

        let stored = store.get(id).expect("get").expect("row exists");
        assert!(stored.report.user_id.is_none());
        assert_eq!(stored.browser, BrowserFamily::Other);
    }

    #[test]
    fn test_get_missing() {
        let store = SqliteErrorStore::in_memory().expect("open store");
        assert!(store.get(ReportId::new(42)).expect("get").is_none());
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn test_file_backed_persists_across_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("jserrorlog.db");

        let id = {
            let store = SqliteErrorStore::new(&path).expect("open store");
            assert_eq!(store.db_path(), Some(&path));
            store.store(&sample_report()).expect("store")
        };

        let reopened = SqliteErrorStore::new(&path).expect("reopen store");
        assert_eq!(reopened.count().expect("count"), 1);
        assert!(reopened.get(id).expect("get").is_some());
    }
}
