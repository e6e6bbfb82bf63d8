//! Fingerprint CLI command.

use crate::services::throttle::Fingerprinter;
use crate::{Error, Result};
use std::io::Write;

/// Prints the normalized URL and throttle key for a `(url, line)` pair.
#[derive(Debug, Clone)]
pub struct FingerprintCommand {
    url: String,
    line: u32,
}

impl FingerprintCommand {
    /// Creates the command.
    #[must_use]
    pub fn new(url: impl Into<String>, line: u32) -> Self {
        Self {
            url: url.into(),
            line,
        }
    }

    /// Writes the normalized URL and key to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if `out` cannot be written.
    pub fn execute(&self, out: &mut dyn Write) -> Result<()> {
        let normalized = Fingerprinter::normalize_url(&self.url);
        let key = Fingerprinter::fingerprint(&self.url, self.line);

        writeln!(out, "normalized: {normalized}")
            .and_then(|()| writeln!(out, "key:        {key}"))
            .map_err(|e| Error::OperationFailed {
                operation: "write_output".to_string(),
                cause: e.to_string(),
            })
    }
}
