//! Data models for jserrorlog.
//!
//! This module contains the error report submitted by browsers and the small
//! value types derived from it.

mod browser;
mod report;

pub use browser::BrowserFamily;
pub use report::{ErrorReport, LoadPhase, ReportId, ReportMeta};
