//! Notification throttling.
//!
//! Maps each error report to a [`FingerprintKey`] and remembers, per key,
//! until when further notifications are suppressed.
//!
//! # Backends
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | memory | [`MemoryThrottleCache`] | Process-local LRU, default |
//! | redis | `RedisThrottleCache` | Shared across processes, `redis` feature |

mod cache;
mod clock;
mod fingerprint;
mod redis;

pub use cache::{DEFAULT_CAPACITY, MemoryThrottleCache, ThrottleCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::{FingerprintKey, Fingerprinter};
#[cfg(feature = "redis")]
pub use redis::{DEFAULT_REDIS_TIMEOUT, RedisThrottleCache};
