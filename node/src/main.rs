// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Piggy Node
//!
//! Entry point for the `piggy-node` binary. Parses CLI arguments, initializes
//! logging and metrics, provisions any startup vaults, and serves the REST
//! API and the metrics endpoint.
//!
//! The binary supports three subcommands:
//!
//! - `run`     : start the node
//! - `identity`: print the identity derived from a label
//! - `version` : print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use piggy_protocol::{Identity, ManualClock};

use cli::{Commands, PiggyNodeCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PiggyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Identity(args) => {
            println!("{}", Identity::derive(&args.label));
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format)
        .context("failed to install tracing subscriber")?;

    tracing::info!(
        admin = %args.admin,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        manual_clock = args.manual_clock,
        "starting piggy-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let manual_clock = args.manual_clock.then(ManualClock::starting_now);
    let app_state = api::AppState::new(
        args.admin,
        manual_clock,
        Arc::clone(&node_metrics),
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            piggy_protocol::config::PROTOCOL_VERSION,
        ),
    );

    // --- Startup provisioning ---
    provision_startup_vaults(&app_state, &args.provision)?;

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("piggy-node stopped");
    Ok(())
}

/// Provisions a vault for each identity named with `--provision`, acting as
/// the admin. Identities that already have one are skipped.
fn provision_startup_vaults(state: &api::AppState, targets: &[Identity]) -> Result<()> {
    let (mut chain, now) = state.write_chain();
    let admin = chain.registry.admin();

    for target in targets {
        if chain.registry.is_registered(target) {
            tracing::warn!(identity = %target, "duplicate --provision ignored");
            continue;
        }
        let vault = chain
            .registry
            .provision(admin, *target, now)
            .with_context(|| format!("failed to provision vault for {}", target))?;
        state.metrics.registrations_total.inc();
        tracing::info!(identity = %target, vault = %vault, "startup vault provisioned");
    }

    state
        .metrics
        .vaults_registered
        .set(chain.registry.total_registered() as i64);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("piggy-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", piggy_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
