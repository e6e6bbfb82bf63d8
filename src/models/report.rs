//! Error report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Identifier assigned to a persisted error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(i64);

impl ReportId {
    /// Creates a new report ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row identifier.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When the error happened relative to page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadPhase {
    /// Raised before the page finished loading.
    Before,
    /// Raised after the page finished loading.
    After,
    /// Reported with an unrecognized or missing phase.
    #[default]
    Unknown,
}

impl LoadPhase {
    /// Returns the phase as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the human readable label used in notifications.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Before => "Before page load",
            Self::After => "After page load",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses a phase string (case-insensitive). Unrecognized values map to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "before" => Self::Before,
            "after" => Self::After,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LoadPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoadPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Extra key/value pairs attached to a report by the page.
///
/// Keys iterate in sorted (byte-wise) order, not in the order the page sent
/// them. Rendering, persistence and `to_json` all observe this order, so two
/// reports with the same pairs always produce the same output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportMeta(BTreeMap<String, String>);

impl ReportMeta {
    /// Creates an empty meta mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builds a mapping from `(name, value)` pairs; later duplicates win.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Inserts a key/value pair.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if no pairs are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the flattened mapping.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Serializes the mapping to JSON, or an empty string when there are no pairs.
    #[must_use]
    pub fn to_json(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// A JavaScript error reported by a browser.
///
/// Immutable once constructed: the router, dispatcher and stores only ever
/// receive `&ErrorReport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// URL of the page that loaded the failing script.
    pub page: String,
    /// URL of the script that raised the error.
    pub url: String,
    /// Error text.
    pub message: String,
    /// Line number within `url`.
    pub line: u32,
    /// Phase relative to page load.
    #[serde(default)]
    pub when: LoadPhase,
    /// Browser user agent string.
    #[serde(default, alias = "userAgent")]
    pub user_agent: String,
    /// Extra key/value pairs attached by the page.
    #[serde(default)]
    pub meta: ReportMeta,
    /// Ingestion timestamp.
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Authenticated user, if any.
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    /// Session key (possibly empty).
    #[serde(default, alias = "sessionKey")]
    pub session_key: String,
    /// Address of the submitting client.
    #[serde(default, alias = "remoteAddr")]
    pub remote_addr: String,
}

impl ErrorReport {
    /// Creates a report with the required fields, stamped with the current time.
    #[must_use]
    pub fn new(
        page: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            page: page.into(),
            url: url.into(),
            message: message.into(),
            line,
            when: LoadPhase::Unknown,
            user_agent: String::new(),
            meta: ReportMeta::new(),
            created_at: Utc::now(),
            user_id: None,
            session_key: String::new(),
            remote_addr: String::new(),
        }
    }

    /// Sets the load phase.
    #[must_use]
    pub fn with_when(mut self, when: LoadPhase) -> Self {
        self.when = when;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the meta mapping.
    #[must_use]
    pub fn with_meta(mut self, meta: ReportMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the ingestion timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the user identifier.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the session key.
    #[must_use]
    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = session_key.into();
        self
    }

    /// Sets the remote address.
    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = remote_addr.into();
        self
    }

    /// Parses a report from one line of JSON.
    ///
    /// Missing optional fields take their defaults; a missing `created_at`
    /// is stamped with the current time.
    pub fn from_json(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::InvalidInput(format!("malformed report: {e}")))
    }

    /// Formats `created_at` as an absolute timestamp (`%Y-%m-%d %H:%M:%S`).
    #[must_use]
    pub fn created_at_display(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
