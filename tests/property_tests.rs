//! Property-based tests for fingerprinting and throttling.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Fingerprints are deterministic and well-formed
//! - Cosmetic URL variants (host case, default port, escaped unreserved
//!   characters) share a fingerprint
//! - Distinct lines never share a fingerprint
//! - A fresh key is admitted exactly once per window

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use jserrorlog::services::throttle::{
    Clock, Fingerprinter, ManualClock, MemoryThrottleCache, ThrottleCache,
};
use proptest::prelude::*;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

fn host() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,10}(\\.[a-z]{2,5}){1,2}"
}

fn path_segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9_~-]{1,12}", 1..5)
}

/// Percent-encodes every byte of a segment (all are unreserved).
fn escape_all(segment: &str) -> String {
    segment.bytes().fold(String::new(), |mut out, b| {
        let _ = write!(out, "%{b:02x}");
        out
    })
}

proptest! {
    /// Property: fingerprinting is deterministic.
    #[test]
    fn prop_fingerprint_deterministic(url in ".{0,80}", line in any::<u32>()) {
        prop_assert_eq!(
            Fingerprinter::fingerprint(&url, line),
            Fingerprinter::fingerprint(&url, line)
        );
    }

    /// Property: keys are `jserrorlog.notify.<64 hex>:<line>`.
    #[test]
    fn prop_key_layout(url in ".{0,80}", line in any::<u32>()) {
        let key = Fingerprinter::fingerprint(&url, line);
        let rest = key
            .as_str()
            .strip_prefix("jserrorlog.notify.")
            .expect("prefix");
        let (digest, line_part) = rest.split_once(':').expect("line separator");
        prop_assert_eq!(digest.len(), 64);
        prop_assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        prop_assert_eq!(line_part, line.to_string());
    }

    /// Property: distinct lines give distinct keys.
    #[test]
    fn prop_lines_distinguish(url in ".{0,80}", a in any::<u32>(), b in any::<u32>()) {
        prop_assume!(a != b);
        prop_assert_ne!(
            Fingerprinter::fingerprint(&url, a),
            Fingerprinter::fingerprint(&url, b)
        );
    }

    /// Property: escaping unreserved path characters does not change the key.
    #[test]
    fn prop_escaped_unreserved_equivalent(
        host in host(),
        segments in path_segments(),
        line in 1u32..10_000,
    ) {
        let plain = format!("http://{host}/{}.js", segments.join("/"));
        let escaped = format!(
            "http://{host}/{}.js",
            segments.iter().map(|s| escape_all(s)).collect::<Vec<_>>().join("/")
        );
        prop_assert_eq!(
            Fingerprinter::fingerprint(&plain, line),
            Fingerprinter::fingerprint(&escaped, line)
        );
    }

    /// Property: scheme/host case and the default port are insignificant.
    #[test]
    fn prop_host_case_and_default_port(
        host in host(),
        segments in path_segments(),
        line in 1u32..10_000,
    ) {
        let path = segments.join("/");
        let canonical = format!("http://{host}/{path}");
        let shouted = format!("HTTP://{}:80/{path}", host.to_uppercase());
        prop_assert_eq!(
            Fingerprinter::fingerprint(&canonical, line),
            Fingerprinter::fingerprint(&shouted, line)
        );
    }

    /// Property: normalizing an http URL twice is the same as once.
    #[test]
    fn prop_normalize_idempotent(host in host(), segments in path_segments()) {
        let url = format!("http://{host}/{}", segments.join("/"));
        let once = Fingerprinter::normalize_url(&url);
        prop_assert_eq!(Fingerprinter::normalize_url(&once), once);
    }

    /// Property: a fresh key is admitted once, then throttled until the
    /// window has fully elapsed.
    #[test]
    fn prop_single_admission_per_window(
        checks in 2usize..20,
        window_secs in 1u64..3_600,
    ) {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryThrottleCache::with_clock(16, Arc::clone(&clock) as Arc<dyn Clock>)
            .expect("cache");
        let key = Fingerprinter::fingerprint("http://x/app.js", 87);
        let window = Duration::from_secs(window_secs);

        let admitted = (0..checks)
            .filter(|_| !cache.check_and_mark(&key, window).expect("check"))
            .count();
        prop_assert_eq!(admitted, 1);

        clock.advance(window);
        prop_assert!(!cache.check_and_mark(&key, window).expect("check after window"));
    }
}
