//! Error report persistence.
//!
//! The router's persist handler writes every accepted report through the
//! [`ErrorStore`] trait:
//! - [`SqliteErrorStore`]: durable `error_logs` table (default)
//! - [`MemoryErrorStore`]: in-process, for dry runs and tests

// Dropping the connection guard slightly earlier provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

mod memory;
pub mod sqlite;
mod traits;

pub use memory::MemoryErrorStore;
pub use sqlite::SqliteErrorStore;
pub use traits::{ErrorStore, StoredReport};
