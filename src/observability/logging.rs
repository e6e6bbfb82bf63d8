//! Log filter construction.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the event filter.
///
/// `RUST_LOG` wins over the configured level; `verbose` forces `debug`
/// for this crate on top of whichever base filter applies.
#[allow(clippy::print_stderr)]
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|e| {
            eprintln!("invalid log level '{}': {e}; using 'info'", config.level);
            EnvFilter::new("info")
        });

    if verbose {
        match "jserrorlog=debug".parse() {
            Ok(directive) => base.add_directive(directive),
            Err(_) => base,
        }
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LoggingConfig {
            level: "[[not a filter".to_string(),
            ..LoggingConfig::default()
        };
        // Must not panic; the fallback filter is still usable.
        let filter = build_filter(&config, false);
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_verbose_adds_crate_directive() {
        let filter = build_filter(&LoggingConfig::default(), true);
        assert!(filter.to_string().contains("jserrorlog=debug"));
    }
}
