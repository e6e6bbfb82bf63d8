//! Backend factory.
//!
//! Centralizes construction of the shared backends from configuration:
//!
//! ```text
//! BackendFactory
//!   ├── create_throttle_cache() → Arc<dyn ThrottleCache>
//!   └── create_error_store()    → Arc<dyn ErrorStore>
//! ```

use crate::config::{StorageConfig, ThrottleBackendKind, ThrottleConfig};
use crate::services::throttle::{MemoryThrottleCache, ThrottleCache};
use crate::storage::{ErrorStore, SqliteErrorStore};
use crate::Result;
use std::sync::Arc;

/// Builds backends from configuration.
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the configured throttle cache.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the capacity is zero, the Redis
    /// URL is missing or invalid, or the `redis` feature is not compiled in.
    pub fn create_throttle_cache(config: &ThrottleConfig) -> Result<Arc<dyn ThrottleCache>> {
        match config.backend {
            ThrottleBackendKind::Memory => {
                let cache = MemoryThrottleCache::new(config.capacity)?;
                tracing::debug!(capacity = config.capacity, "Using in-memory throttle cache");
                Ok(Arc::new(cache))
            },
            ThrottleBackendKind::Redis => Self::create_redis_cache(config),
        }
    }

    #[cfg(feature = "redis")]
    fn create_redis_cache(config: &ThrottleConfig) -> Result<Arc<dyn ThrottleCache>> {
        let url = config.redis_url.as_deref().ok_or_else(|| {
            crate::Error::InvalidInput("throttle.redis_url is required for the redis backend".to_string())
        })?;
        let cache = crate::services::throttle::RedisThrottleCache::new(url, config.timeout)?;
        tracing::debug!(timeout_ms = config.timeout.as_millis(), "Using redis throttle cache");
        Ok(Arc::new(cache))
    }

    #[cfg(not(feature = "redis"))]
    fn create_redis_cache(_config: &ThrottleConfig) -> Result<Arc<dyn ThrottleCache>> {
        Err(crate::Error::InvalidInput(
            "throttle.backend = \"redis\" requires the `redis` feature".to_string(),
        ))
    }

    /// Opens the `SQLite` error store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn create_error_store(config: &StorageConfig) -> Result<Arc<dyn ErrorStore>> {
        if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| crate::Error::OperationFailed {
                operation: "create_database_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let store = SqliteErrorStore::new(&config.database)?;
        tracing::debug!(database = %config.database.display(), "Opened error store");
        Ok(Arc::new(store))
    }
}
