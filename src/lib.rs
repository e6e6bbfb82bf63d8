//! # jserrorlog
//!
//! Ingests JavaScript error reports submitted from browsers, persists them, and
//! sends a rate-limited notification when a new distinct error shows up.
//!
//! ## Features
//!
//! - Fingerprinting of reports by canonical script URL and line number
//! - Time-windowed throttle cache with an atomic check-and-mark contract
//! - Pluggable throttle backends (in-memory LRU, Redis `SET NX PX`)
//! - Notification delivery over SMTP, webhook, or the log
//! - Explicit event router fanning accepted reports out to persistence and notification
//!
//! ## Example
//!
//! ```rust,ignore
//! use jserrorlog::{ErrorReport, EventRouter, JserrorlogConfig};
//!
//! let config = JserrorlogConfig::load_default();
//! let router = EventRouter::from_config(&config)?;
//! router.publish(&ErrorReport::new(
//!     "http://localhost/?test=key",
//!     "http://localhost/static/app.js",
//!     "Uncaught ReferenceError: aaa is not defined",
//!     87,
//! ))?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod notify;
pub mod observability;
pub mod router;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{FeatureFlags, JserrorlogConfig, NotifyRecipient};
pub use models::{BrowserFamily, ErrorReport, LoadPhase, ReportId, ReportMeta};
pub use notify::{NotificationDispatcher, NotifyOutcome};
pub use router::{AggregateHandlerError, EventRouter, HandlerFailure, ReportHandler};
pub use services::throttle::{FingerprintKey, Fingerprinter, MemoryThrottleCache, ThrottleCache};
pub use storage::{ErrorStore, MemoryErrorStore, SqliteErrorStore};

/// Error type for jserrorlog operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Policy |
/// |---------|-------------|--------|
/// | `InvalidInput` | Malformed report JSON, invalid configuration | surfaced to caller |
/// | `OperationFailed` | I/O errors, lock failures, handler panics | surfaced to caller |
/// | `CacheUnavailable` | Throttle backend unreachable or poisoned | dispatcher fails open |
/// | `DeliveryFailed` | Notification transport error | surfaced, no retry, throttle entry kept |
/// | `StoreFailed` | Error store write failed | surfaced as a handler error |
/// | `RenderFailed` | Subject/body template failed to render | surfaced as a handler error |
/// | `HandlersFailed` | One or more router handlers failed | aggregate returned by `publish` |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The throttle cache backend could not be reached.
    #[error("throttle cache '{backend}' unavailable: {cause}")]
    CacheUnavailable {
        /// Backend name (`memory`, `redis`).
        backend: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// A notification could not be delivered.
    #[error("delivery via '{transport}' failed: {cause}")]
    DeliveryFailed {
        /// Transport name (`smtp`, `webhook`, `log`).
        transport: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// An error report could not be persisted.
    #[error("store failed: {cause}")]
    StoreFailed {
        /// The underlying cause.
        cause: String,
    },

    /// A notification template failed to render.
    #[error("template '{template}' failed to render: {cause}")]
    RenderFailed {
        /// Template name (`subject`, `body`).
        template: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// One or more router handlers failed while dispatching a report.
    #[error(transparent)]
    HandlersFailed(#[from] AggregateHandlerError),
}

impl Error {
    /// Returns true if this is a throttle backend failure.
    #[must_use]
    pub const fn is_cache_unavailable(&self) -> bool {
        matches!(self, Self::CacheUnavailable { .. })
    }
}

/// Result type alias for jserrorlog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Uses `SystemTime::now()` with fallback to 0 if the system clock is before
/// the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use jserrorlog::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
