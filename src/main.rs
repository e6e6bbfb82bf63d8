//! Binary entry point for jserrorlog.
//!
//! This binary replays captured browser error reports through the event
//! router and inspects throttle keys.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use jserrorlog::JserrorlogConfig;
use jserrorlog::cli::{FingerprintCommand, IngestCommand};
use jserrorlog::observability::{self, InitOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// jserrorlog - Browser JavaScript error ingestion with throttled notifications.
#[derive(Parser)]
#[command(name = "jserrorlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "JSERRORLOG_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Publish newline-delimited JSON reports through the router.
    Ingest {
        /// Read reports from this file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Use an in-memory store and log the notifications instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the throttle key for a script URL and line.
    Fingerprint {
        /// Script URL.
        #[arg(short, long)]
        url: String,

        /// Line number.
        #[arg(short, long)]
        line: u32,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is the common case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init(
        &config,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command. Returns `Ok(false)` when the command ran but
/// some of its work failed.
fn run_command(
    command: Commands,
    config: &JserrorlogConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Ingest { file, dry_run } => {
            let mut ingest = IngestCommand::new().with_dry_run(dry_run);
            if let Some(path) = file {
                ingest = ingest.with_file(path);
            }
            let summary = ingest.execute(config, &mut stdout)?;
            Ok(summary.is_success())
        },
        Commands::Fingerprint { url, line } => {
            FingerprintCommand::new(url, line).execute(&mut stdout)?;
            Ok(true)
        },
    }
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> Result<JserrorlogConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => JserrorlogConfig::load_from_file(path)?,
        None => JserrorlogConfig::load_default(),
    };
    config.validate()?;
    Ok(config)
}
