//! CLI command implementations.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Publish newline-delimited JSON error reports through the router |
//! | `fingerprint` | Print the throttle key for a script URL and line |
//!
//! # Example Usage
//!
//! ```bash
//! # Replay captured reports without touching the database or mail relay
//! jserrorlog ingest --file reports.jsonl --dry-run
//!
//! # Which key would throttle this error?
//! jserrorlog fingerprint --url "http://localhost/static/app.js" --line 87
//! ```

mod fingerprint;
mod ingest;

pub use fingerprint::FingerprintCommand;
pub use ingest::{IngestCommand, IngestFailure, IngestSummary};
