//! Values handed to templates and transports.

use crate::models::{BrowserFamily, ErrorReport};
use serde::Serialize;
use std::collections::BTreeMap;

/// Flattened view of an [`ErrorReport`] for template rendering.
///
/// Every field is display-ready: `created_at` is an absolute timestamp
/// string, `when` is the human label and a missing user renders as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContext {
    /// Page that loaded the failing script.
    pub page: String,
    /// Script URL.
    pub url: String,
    /// Error text.
    pub message: String,
    /// Line number.
    pub line: u32,
    /// Load phase label (`Before page load`, ...).
    pub when: String,
    /// Raw user agent.
    pub user_agent: String,
    /// Browser family derived from the user agent.
    pub browser: String,
    /// Meta pairs, sorted by key.
    pub meta: BTreeMap<String, String>,
    /// `%Y-%m-%d %H:%M:%S` ingestion time.
    pub created_at: String,
    /// User identifier, empty when anonymous.
    pub user_id: String,
    /// Session key.
    pub session_key: String,
    /// Client address.
    pub remote_addr: String,
}

impl NotificationContext {
    /// Builds the context for a report.
    #[must_use]
    pub fn from_report(report: &ErrorReport) -> Self {
        Self {
            page: report.page.clone(),
            url: report.url.clone(),
            message: report.message.clone(),
            line: report.line,
            when: report.when.label().to_string(),
            user_agent: report.user_agent.clone(),
            browser: BrowserFamily::from_user_agent(&report.user_agent).to_string(),
            meta: report.meta.as_map().clone(),
            created_at: report.created_at_display(),
            user_id: report.user_id.clone().unwrap_or_default(),
            session_key: report.session_key.clone(),
            remote_addr: report.remote_addr.clone(),
        }
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Subject line, including the configured prefix.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoadPhase, ReportMeta};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_from_report() {
        let report = ErrorReport::new("http://x/", "http://x/app.js", "Err A", 87)
            .with_when(LoadPhase::Before)
            .with_meta(ReportMeta::from_pairs([("build", "42")]))
            .with_created_at(Utc.with_ymd_and_hms(2012, 12, 17, 10, 20, 0).unwrap());

        let ctx = NotificationContext::from_report(&report);
        assert_eq!(ctx.when, "Before page load");
        assert_eq!(ctx.created_at, "2012-12-17 10:20:00");
        assert_eq!(ctx.user_id, "");
        assert_eq!(ctx.browser, "Other");
        assert_eq!(ctx.meta.get("build").map(String::as_str), Some("42"));
    }
}
