//! Browser family detection from user agent strings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Browser family derived from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrowserFamily {
    /// Microsoft Edge (Chromium or legacy).
    Edge,
    /// Opera.
    Opera,
    /// Google Chrome and Chromium.
    Chrome,
    /// Mozilla Firefox.
    Firefox,
    /// Apple Safari.
    Safari,
    /// Internet Explorer.
    #[serde(rename = "IE")]
    InternetExplorer,
    /// Anything not recognized.
    Other,
}

/// Ordered detection rules. Order matters: Chromium derivatives also
/// advertise `Chrome/` and `Safari/`, Chrome advertises `Safari/`.
static RULES: LazyLock<Vec<(Regex, BrowserFamily)>> = LazyLock::new(|| {
    [
        (r"Edg(?:e|A|iOS)?/", BrowserFamily::Edge),
        (r"OPR/|Opera", BrowserFamily::Opera),
        (r"Chrome/|CriOS/|Chromium/", BrowserFamily::Chrome),
        (r"Firefox/|FxiOS/", BrowserFamily::Firefox),
        (r"MSIE |Trident/", BrowserFamily::InternetExplorer),
        (r"Safari/", BrowserFamily::Safari),
    ]
    .into_iter()
    .map(|(pattern, family)| (Regex::new(pattern).unwrap_or_else(|_| unreachable!()), family))
    .collect()
});

impl BrowserFamily {
    /// Classifies a user agent string.
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(user_agent))
            .map_or(Self::Other, |(_, family)| *family)
    }

    /// Parses a stored display name. Unknown names map to `Other`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "Edge" => Self::Edge,
            "Opera" => Self::Opera,
            "Chrome" => Self::Chrome,
            "Firefox" => Self::Firefox,
            "Safari" => Self::Safari,
            "IE" => Self::InternetExplorer,
            _ => Self::Other,
        }
    }

    /// Returns the display name stored alongside persisted reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Edge => "Edge",
            Self::Opera => "Opera",
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::InternetExplorer => "IE",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
