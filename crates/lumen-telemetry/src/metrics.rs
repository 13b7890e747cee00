//! Prometheus metrics for wallet synchronization.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught at first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Encoder, Gauge, GaugeVec, TextEncoder,
};

/// Push socket state (1 = connected, 0 = disconnected).
pub static SOCKET_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "lumen_socket_connected",
        "Push socket connection state (1=connected)"
    )
    .unwrap()
});

/// Push socket state machine current state.
/// Labels: state (disconnected/connecting/connected)
pub static SOCKET_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "lumen_socket_state",
        "Push socket state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Successful socket opens.
pub static SOCKET_CONNECTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("lumen_socket_connects_total", "Total push socket opens").unwrap()
});

/// Failed socket opens.
pub static SOCKET_CONNECT_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lumen_socket_connect_failures_total",
        "Total failed push socket opens"
    )
    .unwrap()
});

/// Socket teardowns.
/// Labels: reason (local/remote)
pub static SOCKET_DISCONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_socket_disconnects_total",
        "Total push socket teardowns",
        &["reason"]
    )
    .unwrap()
});

/// Failed portal registration calls.
/// Labels: call (listen_account/remove_account/remove_ws)
pub static PORTAL_CALL_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_portal_call_failures_total",
        "Total failed portal registration calls",
        &["call"]
    )
    .unwrap()
});

/// Push messages received on the socket.
pub static PUSH_MESSAGES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lumen_push_messages_total",
        "Total push messages received"
    )
    .unwrap()
});

/// Account ids extracted from push messages.
pub static PUSH_ACCOUNTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lumen_push_accounts_total",
        "Total account ids extracted from push messages"
    )
    .unwrap()
});

/// Fan-out passes.
/// Labels: outcome (published/empty/suppressed)
pub static FANOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_fanout_total",
        "Total fan-out passes by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Registered subscribers.
pub static SUBSCRIBERS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("lumen_subscribers", "Registered update subscribers").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record socket opened.
    pub fn socket_connected() {
        SOCKET_CONNECTED.set(1.0);
        SOCKET_CONNECTS_TOTAL.inc();
    }

    /// Record socket open failure.
    pub fn socket_connect_failed() {
        SOCKET_CONNECT_FAILURES_TOTAL.inc();
    }

    /// Record socket teardown.
    pub fn socket_disconnected(reason: &str) {
        SOCKET_CONNECTED.set(0.0);
        SOCKET_DISCONNECTS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Set socket state machine state.
    /// Only the active state is set to 1.
    pub fn socket_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected"] {
            SOCKET_STATE.with_label_values(&[s]).set(0.0);
        }
        SOCKET_STATE.with_label_values(&[state]).set(1.0);
    }

    /// Record a failed portal call.
    pub fn portal_call_failed(call: &str) {
        PORTAL_CALL_FAILURES_TOTAL.with_label_values(&[call]).inc();
    }

    /// Record a push message and the number of ids it carried.
    pub fn push_received(accounts: usize) {
        PUSH_MESSAGES_TOTAL.inc();
        PUSH_ACCOUNTS_TOTAL.inc_by(accounts as f64);
    }

    /// Record a fan-out pass.
    pub fn fanout(outcome: &str) {
        FANOUT_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Set registered subscriber count.
    pub fn subscribers(count: usize) {
        SUBSCRIBERS.set(count as f64);
    }

    /// Render all registered metrics in the text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
