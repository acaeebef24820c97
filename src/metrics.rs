//! Prometheus metrics for the faucet service
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Gauge, GaugeVec, HistogramVec,
};

lazy_static! {
    // Claim outcomes
    pub static ref CLAIMS_TOTAL: CounterVec = register_counter_vec!(
        "faucet_claims_total",
        "Total claim attempts by asset and outcome",
        &["asset", "outcome"]
    ).unwrap();

    // Transfer metrics
    pub static ref TRANSFERS_SUBMITTED: CounterVec = register_counter_vec!(
        "faucet_transfers_submitted_total",
        "Total transfers submitted to the ledger",
        &["asset", "status"]
    ).unwrap();

    pub static ref TRANSFER_LATENCY: HistogramVec = register_histogram_vec!(
        "faucet_transfer_latency_seconds",
        "Time from submission to terminal outcome",
        &["asset"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Pool state
    pub static ref POOL_BALANCE: GaugeVec = register_gauge_vec!(
        "faucet_pool_balance",
        "Last observed pool balance by asset (display units)",
        &["asset"]
    ).unwrap();

    // Reconciliation
    pub static ref COOLDOWNS_REPAIRED: Counter = register_counter!(
        "faucet_cooldowns_repaired_total",
        "Cooldown entries repaired for confirmed claims"
    ).unwrap();

    pub static ref STRAY_SUCCESSES_RESOLVED: Counter = register_counter!(
        "faucet_stray_successes_resolved_total",
        "Failed claims upgraded after a late confirmation"
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "faucet_up",
        "Whether the faucet is up and running"
    ).unwrap();
}

/// Record a claim attempt outcome
pub fn record_claim(asset: &str, outcome: &str) {
    CLAIMS_TOTAL.with_label_values(&[asset, outcome]).inc();
}

/// Record a transfer submission
pub fn record_transfer_submitted(asset: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    TRANSFERS_SUBMITTED
        .with_label_values(&[asset, status])
        .inc();
}

/// Record transfer latency
pub fn record_transfer_latency(asset: &str, seconds: f64) {
    TRANSFER_LATENCY
        .with_label_values(&[asset])
        .observe(seconds);
}

/// Record last observed pool balance
pub fn set_pool_balance(asset: &str, balance: f64) {
    POOL_BALANCE.with_label_values(&[asset]).set(balance);
}

/// Record a cooldown repair
pub fn record_cooldown_repaired() {
    COOLDOWNS_REPAIRED.inc();
}

/// Record a stray-success upgrade
pub fn record_stray_success_resolved() {
    STRAY_SUCCESSES_RESOLVED.inc();
}
