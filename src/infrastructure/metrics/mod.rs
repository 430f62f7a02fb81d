//! Prometheus Metrics Module
//!
//! Provides gateway-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connection gauges (connected / authenticated)
//! - Active room gauge
//! - Message counters by direction and type
//! - Heartbeat evictions
//! - External handler failures

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new(
            "websocket_connections_active",
            "Number of active WebSocket connections",
        )
        .namespace("sync_gateway"),
        &["state"], // "connected", "authenticated"
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Rooms with at least one member
pub static ROOMS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("rooms_active", "Number of rooms with at least one member")
            .namespace("sync_gateway"),
    )
    .expect("Failed to create ROOMS_ACTIVE metric")
});

/// Envelope counter - tracks frames by direction and message type
pub static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_total", "Total number of protocol messages")
            .namespace("sync_gateway"),
        &["direction", "type"], // "inbound", "outbound"
    )
    .expect("Failed to create MESSAGES_TOTAL metric")
});

/// Connections evicted by the liveness sweep
pub static HEARTBEAT_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "heartbeat_evictions_total",
            "Connections evicted for missing heartbeats",
        )
        .namespace("sync_gateway"),
    )
    .expect("Failed to create HEARTBEAT_EVICTIONS_TOTAL metric")
});

/// External handler failures by handler
pub static HANDLER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("handler_failures_total", "External handler failures")
            .namespace("sync_gateway"),
        &["handler"], // "game", "environment", "team", "identity"
    )
    .expect("Failed to create HANDLER_FAILURES_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(ROOMS_ACTIVE.clone()))
        .expect("Failed to register ROOMS_ACTIVE");
    registry
        .register(Box::new(MESSAGES_TOTAL.clone()))
        .expect("Failed to register MESSAGES_TOTAL");
    registry
        .register(Box::new(HEARTBEAT_EVICTIONS_TOTAL.clone()))
        .expect("Failed to register HEARTBEAT_EVICTIONS_TOTAL");
    registry
        .register(Box::new(HANDLER_FAILURES_TOTAL.clone()))
        .expect("Failed to register HANDLER_FAILURES_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not valid UTF-8: {}", e))
}

/// Helper to update WebSocket connection count
pub fn set_websocket_connections(connected: usize, authenticated: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE
        .with_label_values(&["connected"])
        .set(connected as f64);
    WEBSOCKET_CONNECTIONS_ACTIVE
        .with_label_values(&["authenticated"])
        .set(authenticated as f64);
}

/// Helper to update the active room gauge
pub fn set_rooms_active(rooms: usize) {
    ROOMS_ACTIVE.set(rooms as i64);
}

/// Helper to count an inbound or outbound envelope
pub fn record_message(direction: &str, message_type: &str) {
    MESSAGES_TOTAL
        .with_label_values(&[direction, message_type])
        .inc();
}

/// Helper to count a liveness eviction
pub fn record_eviction() {
    HEARTBEAT_EVICTIONS_TOTAL.inc();
}

/// Helper to count an external handler failure
pub fn record_handler_failure(handler: &str) {
    HANDLER_FAILURES_TOTAL.with_label_values(&[handler]).inc();
}
