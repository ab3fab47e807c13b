//! # Prometheus Metrics
//!
//! Exposes vault activity counters. Scraped by Prometheus at the `/metrics`
//! HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with the
//! `piggy_` prefix so they do not collide with any default global registry
//! consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Number of vaults in the registry directory.
    pub vaults_registered: IntGauge,
    /// Vaults created by self-registration or provisioning.
    pub registrations_total: IntCounter,
    pub banks_created_total: IntCounter,
    pub deposits_total: IntCounter,
    pub withdrawals_total: IntCounter,
    /// Withdrawals made while the bank was still locked.
    pub early_withdrawals_total: IntCounter,
    /// Sum of breaking fees paid to the admin, in smallest units of any asset.
    pub breaking_fees_collected_total: IntCounter,
    /// Rejected calls, labelled by error kind.
    pub operations_rejected_total: IntCounterVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("piggy".into()), None)?;

        let vaults_registered = register(
            &registry,
            IntGauge::new("vaults_registered", "Number of vaults in the registry")?,
        )?;
        let registrations_total = register(
            &registry,
            IntCounter::new("registrations_total", "Total vaults registered or provisioned")?,
        )?;
        let banks_created_total = register(
            &registry,
            IntCounter::new("banks_created_total", "Total banks opened across all vaults")?,
        )?;
        let deposits_total = register(
            &registry,
            IntCounter::new("deposits_total", "Total settled deposits")?,
        )?;
        let withdrawals_total = register(
            &registry,
            IntCounter::new("withdrawals_total", "Total settled withdrawals")?,
        )?;
        let early_withdrawals_total = register(
            &registry,
            IntCounter::new(
                "early_withdrawals_total",
                "Total withdrawals that paid the breaking fee",
            )?,
        )?;
        let breaking_fees_collected_total = register(
            &registry,
            IntCounter::new(
                "breaking_fees_collected_total",
                "Sum of breaking fees paid to the admin",
            )?,
        )?;
        let operations_rejected_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("operations_rejected_total", "Total rejected operations"),
                &["kind"],
            )?,
        )?;

        Ok(Self {
            registry,
            vaults_registered,
            registrations_total,
            banks_created_total,
            deposits_total,
            withdrawals_total,
            early_withdrawals_total,
            breaking_fees_collected_total,
            operations_rejected_total,
        })
    }

    /// Counts one rejected call of the given error kind.
    pub fn reject(&self, kind: &str) {
        self.operations_rejected_total.with_label_values(&[kind]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<C, prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
