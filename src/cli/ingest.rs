//! Ingest CLI command.
//!
//! Reads one JSON error report per line and publishes each through an
//! [`EventRouter`]. Blank lines are skipped. A malformed line or a failing
//! handler counts as a failure; processing always continues with the next
//! line.

use crate::config::JserrorlogConfig;
use crate::models::ErrorReport;
use crate::notify::{LogDelivery, NotificationDispatcher, TemplateRenderer};
use crate::router::{EventRouter, NotifyHandler, PersistHandler};
use crate::services::BackendFactory;
use crate::storage::MemoryErrorStore;
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// One line that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    /// 1-based input line number.
    pub line_number: usize,
    /// Why it failed.
    pub reason: String,
}

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Reports every handler accepted.
    pub published: usize,
    /// Blank lines skipped.
    pub skipped: usize,
    /// Malformed lines and handler failures.
    pub failures: Vec<IngestFailure>,
}

impl IngestSummary {
    /// Returns true if no line failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ingest command handler.
#[derive(Debug, Clone, Default)]
pub struct IngestCommand {
    file: Option<PathBuf>,
    dry_run: bool,
}

impl IngestCommand {
    /// Creates a command reading from stdin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads reports from `path` instead of stdin.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Uses an in-memory store and the log transport.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builds the router for this run.
    ///
    /// A dry run keeps the configured throttle backend, templates and
    /// feature flags but swaps the database for [`MemoryErrorStore`] and
    /// the transport for [`LogDelivery`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate or a
    /// configured backend cannot be set up.
    pub fn build_router(&self, config: &JserrorlogConfig) -> Result<EventRouter> {
        if !self.dry_run {
            return EventRouter::from_config(config);
        }
        config.validate()?;

        let mut router = EventRouter::new();
        if config.features.persist_enabled {
            router.subscribe(Arc::new(PersistHandler::new(Arc::new(
                MemoryErrorStore::new(),
            ))));
        }
        if config.features.notify_enabled {
            let cache = BackendFactory::create_throttle_cache(&config.throttle)?;
            let renderer = TemplateRenderer::from_config(&config.notify)?;
            let dispatcher =
                NotificationDispatcher::new(cache, Arc::new(LogDelivery), config.notify.interval)
                    .with_renderer(Arc::new(renderer))
                    .with_subject_prefix(config.notify.subject_prefix.clone());
            router.subscribe(Arc::new(NotifyHandler::new(Arc::new(dispatcher))));
        }
        Ok(router)
    }

    /// Publishes every report in `input`.
    pub fn ingest<R: BufRead>(router: &EventRouter, input: R) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for (index, line) in input.lines().enumerate() {
            let line_number = index + 1;
            let outcome = line
                .map_err(|e| Error::OperationFailed {
                    operation: "read_input".to_string(),
                    cause: e.to_string(),
                })
                .and_then(|line| {
                    if line.trim().is_empty() {
                        return Ok(false);
                    }
                    let report = ErrorReport::from_json(&line)?;
                    router.publish(&report)?;
                    Ok(true)
                });

            match outcome {
                Ok(true) => summary.published += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(line_number, error = %e, "Failed to ingest report");
                    summary.failures.push(IngestFailure {
                        line_number,
                        reason: e.to_string(),
                    });
                },
            }
        }

        summary
    }

    /// Runs the command and writes a summary to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the router cannot be built, the input file cannot
    /// be opened, or `out` cannot be written. Per-report failures are only
    /// reported in the summary.
    pub fn execute(&self, config: &JserrorlogConfig, out: &mut dyn Write) -> Result<IngestSummary> {
        let router = self.build_router(config)?;

        let summary = match &self.file {
            Some(path) => {
                let file = File::open(path).map_err(|e| Error::OperationFailed {
                    operation: "open_input".to_string(),
                    cause: format!("{}: {e}", path.display()),
                })?;
                Self::ingest(&router, BufReader::new(file))
            },
            None => Self::ingest(&router, io::stdin().lock()),
        };

        write_summary(out, &summary, self.dry_run).map_err(|e| Error::OperationFailed {
            operation: "write_output".to_string(),
            cause: e.to_string(),
        })?;
        Ok(summary)
    }
}

fn write_summary(out: &mut dyn Write, summary: &IngestSummary, dry_run: bool) -> io::Result<()> {
    if dry_run {
        writeln!(out, "Dry run: nothing was stored or sent")?;
    }
    writeln!(out, "Published: {}", summary.published)?;
    writeln!(out, "Skipped:   {}", summary.skipped)?;
    writeln!(out, "Failed:    {}", summary.failures.len())?;
    for failure in &summary.failures {
        writeln!(out, "  line {}: {}", failure.line_number, failure.reason)?;
    }
    Ok(())
}
