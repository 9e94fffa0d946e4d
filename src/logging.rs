//! Tracing subscriber setup for the `docrag` binary.
//!
//! Logs go to stderr so command output on stdout stays parseable.
//! Filter precedence: `RUST_LOG`, then `--verbose` (debug), then
//! `[logging].level`.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Build the filter directive from the configured level and the CLI flag.
pub fn filter_directive(config_level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { config_level };
    // Keep HTTP and SQL internals quiet unless asked for explicitly.
    format!("{},hyper=warn,reqwest=warn,sqlx=warn", level)
}

/// Install the global subscriber. Call once, before any work.
pub fn init(config_level: &str, verbose: bool, format: LogFormat) -> Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive)?,
        _ => EnvFilter::try_new(filter_directive(config_level, verbose))?,
    };

    match format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
