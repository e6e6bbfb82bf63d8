//! Connection handling for the `SQLite` error store.

use crate::Result;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex with poison recovery.
///
/// A panic while holding the connection leaves the mutex poisoned; the
/// connection itself is still usable, so the guard is recovered and a warning
/// logged instead of failing every later write.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent ingestion.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with throughput
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"), so pragma_update rather than execute_batch
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");

    Ok(())
}
