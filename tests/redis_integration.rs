//! Redis throttle backend integration tests.
//!
//! These tests require a running Redis server. Set the environment variable
//! `JSERRORLOG_TEST_REDIS_URL` to enable them:
//!
//! ```bash
//! export JSERRORLOG_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --features redis redis_integration
//! ```

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::doc_markdown
)]
#![cfg(feature = "redis")]

use jserrorlog::services::throttle::{
    DEFAULT_REDIS_TIMEOUT, FingerprintKey, Fingerprinter, RedisThrottleCache, ThrottleCache,
};
use std::env;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Environment variable for Redis test connection URL.
const REDIS_URL_ENV: &str = "JSERRORLOG_TEST_REDIS_URL";

/// Returns the Redis connection URL if available, or None to skip tests.
fn get_redis_url() -> Option<String> {
    env::var(REDIS_URL_ENV).ok()
}

/// Macro to skip tests when Redis is not available.
macro_rules! require_redis {
    () => {
        match get_redis_url() {
            Some(url) => url,
            None => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run Redis tests.",
                    REDIS_URL_ENV
                );
                return;
            },
        }
    };
}

/// A key no other test run will collide with.
fn unique_key() -> FingerprintKey {
    let url = format!("http://test.invalid/{}.js", Uuid::new_v4().simple());
    Fingerprinter::fingerprint(&url, 87)
}

#[test]
fn test_first_check_admits_second_throttles() {
    let url = require_redis!();
    let cache = RedisThrottleCache::new(&url, DEFAULT_REDIS_TIMEOUT).expect("client");
    let key = unique_key();
    let window = Duration::from_secs(30);

    assert!(!cache.check_and_mark(&key, window).expect("first"));
    assert!(cache.check_and_mark(&key, window).expect("second"));
}

#[test]
fn test_entry_expires_after_window() {
    let url = require_redis!();
    let cache = RedisThrottleCache::new(&url, DEFAULT_REDIS_TIMEOUT).expect("client");
    let key = unique_key();
    let window = Duration::from_millis(200);

    assert!(!cache.check_and_mark(&key, window).expect("first"));
    thread::sleep(Duration::from_millis(400));
    assert!(!cache.check_and_mark(&key, window).expect("after expiry"));
}

#[test]
fn test_concurrent_clients_admit_once() {
    const THREADS: usize = 16;
    let url = require_redis!();
    let key = unique_key();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let url = url.clone();
            let key = key.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // One client per thread, as separate processes would have.
                let cache = RedisThrottleCache::new(&url, DEFAULT_REDIS_TIMEOUT).expect("client");
                barrier.wait();
                cache
                    .check_and_mark(&key, Duration::from_secs(30))
                    .expect("check")
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .filter(|throttled| !throttled)
        .count();
    assert_eq!(admitted, 1);
}
