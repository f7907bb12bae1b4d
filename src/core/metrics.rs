// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of clients currently connected to the gateway.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("respgate_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of channels and patterns with at least one subscriber.
    pub static ref PUBSUB_ACTIVE_SUBSCRIPTIONS: Gauge =
        register_gauge!("respgate_pubsub_active_subscriptions", "Number of channels and patterns with subscribers.").unwrap();

    // --- Counters ---
    /// The total number of commands dispatched since startup.
    pub static ref COMMANDS_PROCESSED_TOTAL: Counter =
        register_counter!("respgate_commands_processed_total", "Total number of commands processed.").unwrap();
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("respgate_connections_received_total", "Total number of connections received.").unwrap();
    /// Connections closed right after accept because the admission hook refused them.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("respgate_connections_rejected_total", "Total number of connections rejected at admission.").unwrap();
    /// Failed store operations, labeled by command.
    pub static ref STORE_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("respgate_store_errors_total", "Total number of failed store operations, labeled by command.", &["command"]).unwrap();
    pub static ref PUBSUB_MESSAGES_DELIVERED_TOTAL: Counter =
        register_counter!("respgate_pubsub_messages_delivered_total", "Total number of published messages queued for subscribers.").unwrap();
    pub static ref SLOW_SUBSCRIBERS_DISCONNECTED_TOTAL: Counter =
        register_counter!("respgate_slow_subscribers_disconnected_total", "Total number of subscribers disconnected for a full outbound queue.").unwrap();

    // --- Histograms ---
    /// A histogram of command dispatch latencies.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("respgate_command_latency_seconds", "Latency of command processing in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
