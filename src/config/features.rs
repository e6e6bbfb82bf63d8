//! Feature flags for the router's standard handlers.

/// Static switches for the persist and notify handlers.
///
/// Read once at startup; the router is built from them and never consults
/// them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Send throttled notifications for new errors.
    pub notify_enabled: bool,
    /// Persist every accepted report.
    pub persist_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl FeatureFlags {
    /// Creates feature flags with both handlers disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            notify_enabled: false,
            persist_enabled: false,
        }
    }

    /// Creates feature flags with both handlers enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            notify_enabled: true,
            persist_enabled: true,
        }
    }
}
