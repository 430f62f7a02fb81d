//! Health Check Handlers
//!
//! Provides health check endpoints for orchestrator liveness checks and operators.
//!
//! # Endpoints
//! - `GET /health` - Status, version, uptime and live gateway counters
//! - `GET /health/live` - Liveness check (is the server running?)

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::Instant;

use crate::startup::AppState;

/// Server start time for uptime calculation
static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);
static SERVER_START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Initialize the server start time (call during startup)
pub fn init_server_start() {
    Lazy::force(&SERVER_START);
    Lazy::force(&SERVER_START_TIME);
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub gateway: GatewayHealth,
}

/// Live counters of the sync gateway
#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub active_connections: usize,
    pub authenticated_connections: usize,
    pub active_rooms: usize,
    pub heartbeat_running: bool,
}

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Simple liveness response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = GatewayHealth {
        active_connections: state.sessions.connection_count(),
        authenticated_connections: state.sessions.authenticated_count(),
        active_rooms: state.rooms.room_count(),
        heartbeat_running: state.heartbeat.is_running(),
    };

    Json(HealthResponse {
        status: determine_status(&gateway),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: SERVER_START.elapsed().as_secs(),
        started_at: SERVER_START_TIME.to_rfc3339(),
        gateway,
    })
}

/// Liveness check - whether the server is running
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// A stopped sweep means dead connections are no longer evicted.
fn determine_status(gateway: &GatewayHealth) -> HealthStatus {
    if gateway.heartbeat_running {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
