//! Redis-backed throttle cache.
//!
//! Uses the native `SET key 1 NX PX <window_ms>` primitive, which tests and
//! marks in one round-trip and lets Redis expire the entry.
//!
//! # Command Timeout
//!
//! Connections are opened with a connect timeout and configured with read
//! and write timeouts, so an unresponsive server surfaces as
//! `CacheUnavailable` instead of blocking the caller.

#[cfg(feature = "redis")]
mod implementation {
    use crate::services::throttle::{FingerprintKey, ThrottleCache};
    use crate::{Error, Result};
    use redis::{Client, Connection};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tracing::instrument;

    /// Default timeout for Redis operations.
    pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_millis(500);

    /// Redis throttle cache.
    ///
    /// Maintains one reusable connection via `Mutex<Option<Connection>>`. A
    /// connection that errors is dropped and the next call reconnects.
    pub struct RedisThrottleCache {
        client: Client,
        connection: Mutex<Option<Connection>>,
        timeout: Duration,
    }

    impl RedisThrottleCache {
        /// Creates a cache for the given Redis URL.
        ///
        /// The connection is opened lazily on first use.
        ///
        /// # Errors
        ///
        /// Returns [`Error::InvalidInput`] if the URL is not a valid Redis URL.
        pub fn new(connection_url: &str, timeout: Duration) -> Result<Self> {
            let client = Client::open(connection_url)
                .map_err(|e| Error::InvalidInput(format!("invalid redis url: {e}")))?;

            Ok(Self {
                client,
                connection: Mutex::new(None),
                timeout,
            })
        }

        fn unavailable(cause: impl ToString) -> Error {
            Error::CacheUnavailable {
                backend: "redis",
                cause: cause.to_string(),
            }
        }

        /// Takes the cached connection, or opens a new one.
        fn get_connection(&self) -> Result<Connection> {
            let mut guard = self.connection.lock().map_err(Self::unavailable)?;
            if let Some(conn) = guard.take() {
                return Ok(conn);
            }
            drop(guard);

            let conn = self
                .client
                .get_connection_with_timeout(self.timeout)
                .map_err(Self::unavailable)?;
            conn.set_read_timeout(Some(self.timeout))
                .map_err(Self::unavailable)?;
            conn.set_write_timeout(Some(self.timeout))
                .map_err(Self::unavailable)?;

            tracing::debug!("Opened redis throttle connection");
            Ok(conn)
        }

        /// Returns a healthy connection for reuse.
        fn return_connection(&self, conn: Connection) {
            if let Ok(mut guard) = self.connection.lock() {
                *guard = Some(conn);
            }
        }
    }

    impl ThrottleCache for RedisThrottleCache {
        #[instrument(skip(self), fields(operation = "throttle_check", backend = "redis", key = %key))]
        fn check_and_mark(&self, key: &FingerprintKey, window: Duration) -> Result<bool> {
            let start = Instant::now();
            let mut conn = self.get_connection()?;

            // PX requires a positive integer
            let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);

            let reply: Option<String> = redis::cmd("SET")
                .arg(key.as_str())
                .arg(1)
                .arg("NX")
                .arg("PX")
                .arg(window_ms)
                .query(&mut conn)
                .map_err(|e| {
                    metrics::counter!("throttle_backend_errors_total", "backend" => "redis")
                        .increment(1);
                    Self::unavailable(e)
                })?;
            self.return_connection(conn);

            // SET NX replies OK when it wrote the key and nil when the key existed
            let throttled = reply.is_none();
            let result = if throttled { "throttled" } else { "marked" };
            metrics::counter!("throttle_checks_total", "backend" => "redis", "result" => result)
                .increment(1);
            metrics::histogram!("throttle_check_duration_ms", "backend" => "redis")
                .record(start.elapsed().as_secs_f64() * 1000.0);
            tracing::debug!(result, "Throttle check complete");

            Ok(throttled)
        }

        fn backend_name(&self) -> &'static str {
            "redis"
        }
    }

}

#[cfg(feature = "redis")]
pub use implementation::{DEFAULT_REDIS_TIMEOUT, RedisThrottleCache};
