//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Quote source health
//! - Execution attempts, approvals and outcomes
//! - Slippage tier escalations
//! - Bridge status polling

use crate::error::{EngineError, EngineResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "swap_executor_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Quote metrics
    pub static ref QUOTES_RECEIVED: CounterVec = register_counter_vec!(
        "swap_executor_quotes_received_total",
        "Usable quotes returned per source",
        &["source"]
    ).unwrap();

    pub static ref QUOTES_FAILED: CounterVec = register_counter_vec!(
        "swap_executor_quotes_failed_total",
        "Quote requests that errored, timed out or returned no route",
        &["source"]
    ).unwrap();

    pub static ref TIER_ESCALATIONS: CounterVec = register_counter_vec!(
        "swap_executor_tier_escalations_total",
        "Escalations to a wider slippage tier",
        &["slippage_bps"]
    ).unwrap();

    // Execution metrics
    pub static ref EXECUTION_ATTEMPTS: CounterVec = register_counter_vec!(
        "swap_executor_execution_attempts_total",
        "Execution attempts against a single quote",
        &["chain_id", "source"]
    ).unwrap();

    pub static ref EXECUTION_OUTCOMES: CounterVec = register_counter_vec!(
        "swap_executor_execution_outcomes_total",
        "Execution attempt outcomes by class",
        &["chain_id", "outcome"]
    ).unwrap();

    pub static ref APPROVALS_SUBMITTED: CounterVec = register_counter_vec!(
        "swap_executor_approvals_submitted_total",
        "Token approval transactions submitted",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "swap_executor_transaction_latency_seconds",
        "Time from submission to receipt",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Bridge metrics
    pub static ref BRIDGE_POLLS: CounterVec = register_counter_vec!(
        "swap_executor_bridge_polls_total",
        "Cross-chain status polls by reported status",
        &["status"]
    ).unwrap();

    pub static ref BRIDGE_OUTCOMES: CounterVec = register_counter_vec!(
        "swap_executor_bridge_outcomes_total",
        "Terminal outcomes of tracked bridge transfers",
        &["outcome"]
    ).unwrap();

    pub static ref ACTIVE_ROUTES: Gauge = register_gauge!(
        "swap_executor_active_routes",
        "Routes currently held in the route registry"
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "swap_executor_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> EngineResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| EngineError::Config(format!("Cannot bind metrics port: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| EngineError::Internal(format!("Metrics server stopped: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_quote_received(source: &str) {
    QUOTES_RECEIVED.with_label_values(&[source]).inc();
}

pub fn record_quote_failed(source: &str) {
    QUOTES_FAILED.with_label_values(&[source]).inc();
}

pub fn record_tier_escalation(slippage_bps: u32) {
    TIER_ESCALATIONS
        .with_label_values(&[&slippage_bps.to_string()])
        .inc();
}

pub fn record_execution_attempt(chain_id: u64, source: &str) {
    EXECUTION_ATTEMPTS
        .with_label_values(&[&chain_id.to_string(), source])
        .inc();
}

/// `outcome` is `success` or an error class name
pub fn record_execution_outcome(chain_id: u64, outcome: &str) {
    EXECUTION_OUTCOMES
        .with_label_values(&[&chain_id.to_string(), outcome])
        .inc();
}

pub fn record_approval_submitted(chain_id: u64) {
    APPROVALS_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_latency(chain_id: u64, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}

pub fn record_bridge_poll(status: &str) {
    BRIDGE_POLLS.with_label_values(&[status]).inc();
}

pub fn record_bridge_outcome(outcome: &str) {
    BRIDGE_OUTCOMES.with_label_values(&[outcome]).inc();
}

pub fn set_active_routes(count: usize) {
    ACTIVE_ROUTES.set(count as f64);
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}
