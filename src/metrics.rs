//! Prometheus metrics for the bridge relay
//!
//! Exposed on the `/metrics` endpoint of the API listener.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};

lazy_static! {
    // Block processing
    pub static ref BLOCKS_PROCESSED: CounterVec = register_counter_vec!(
        "bridge_relay_blocks_processed_total",
        "Total number of blocks scanned for bridge events",
        &["chain"]
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "bridge_relay_latest_block",
        "Highest block fully processed",
        &["chain"]
    ).unwrap();

    // Relay flow
    pub static ref EVENTS_CLASSIFIED: CounterVec = register_counter_vec!(
        "bridge_relay_events_classified_total",
        "Bridge events classified, by kind",
        &["chain", "kind"]
    ).unwrap();

    pub static ref DEPOSITS_DETECTED: CounterVec = register_counter_vec!(
        "bridge_relay_deposits_detected_total",
        "Total number of deposit events detected",
        &["chain"]
    ).unwrap();

    pub static ref WITHDRAWALS_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_relay_withdrawals_submitted_total",
        "Withdrawals submitted on the destination chain",
        &["chain", "status"]
    ).unwrap();

    // Errors
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "bridge_relay_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "bridge_relay_up",
        "Whether the relay is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "bridge_relay_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();
}

pub fn record_blocks_processed(chain: &str, from_block: u64, to_block: u64) {
    let count = to_block.saturating_sub(from_block).saturating_add(1);
    BLOCKS_PROCESSED
        .with_label_values(&[chain])
        .inc_by(count as f64);
    LATEST_BLOCK.with_label_values(&[chain]).set(to_block as f64);
}

pub fn record_event(chain: &str, kind: &str) {
    EVENTS_CLASSIFIED.with_label_values(&[chain, kind]).inc();
}

pub fn record_deposit_detected(chain: &str) {
    DEPOSITS_DETECTED.with_label_values(&[chain]).inc();
}

pub fn record_withdrawal_submitted(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    WITHDRAWALS_SUBMITTED
        .with_label_values(&[chain, status])
        .inc();
}

pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}

pub fn record_successful_poll(chain: &str) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(timestamp);
}
