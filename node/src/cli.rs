//! # CLI Interface
//!
//! Defines the command-line argument structure for `piggy-node` using
//! `clap` derive. Supports three subcommands: `run`, `identity`, and
//! `version`.

use clap::{Parser, Subcommand};

use piggy_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};
use piggy_protocol::Identity;

use crate::logging::LogFormat;

/// Piggy savings-vault devnet node.
///
/// Hosts one vault registry and an in-memory custody ledger, and serves
/// them over a REST API with Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "piggy-node",
    about = "Piggy time-locked savings vault node",
    version,
    propagate_version = true
)]
pub struct PiggyNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the piggy node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print the identity derived from a label.
    Identity(IdentityArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Registry admin: collects breaking fees and may provision vaults.
    ///
    /// Accepts 64 hex characters or `@label`.
    #[arg(long, env = "PIGGY_ADMIN", value_parser = parse_identity)]
    pub admin: Identity,

    /// Identities to provision a vault for at startup. Repeatable.
    #[arg(long = "provision", value_parser = parse_identity)]
    pub provision: Vec<Identity>,

    /// Port for the REST API.
    #[arg(long, env = "PIGGY_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PIGGY_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "PIGGY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Freeze time and expose `POST /clock/advance`.
    #[arg(long)]
    pub manual_clock: bool,
}

/// Arguments for the `identity` subcommand.
#[derive(Parser, Debug)]
pub struct IdentityArgs {
    /// Free-text label, e.g. `alice`.
    pub label: String,
}

/// Parses an identity given as hex or as `@label`.
pub fn parse_identity(s: &str) -> Result<Identity, String> {
    match s.strip_prefix('@') {
        Some("") => Err("empty label after '@'".into()),
        Some(label) => Ok(Identity::derive(label)),
        None => s.parse().map_err(|e| format!("{e}")),
    }
}
