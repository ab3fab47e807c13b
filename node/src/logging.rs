//! # Structured Logging
//!
//! Installs the `tracing` subscriber for the node. Output goes to stderr,
//! either pretty-printed or as JSON lines, and is filtered by `RUST_LOG`
//! when set or by [`DEFAULT_FILTER`] otherwise.
//!
//! Library crates only emit events; this is the one place a subscriber is
//! installed.

use clap::ValueEnum;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str =
    "piggy_node=info,piggy_contracts=info,piggy_protocol=info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored output for local development.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// `RUST_LOG` if it parses, `default_filter` otherwise.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
///
/// # Environment
///
/// ```text
/// RUST_LOG=piggy_contracts=debug,tower_http=info
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    tracing::info!(?format, "logging initialized");
    Ok(())
}
