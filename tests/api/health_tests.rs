//! Health Check API Tests

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;

use crate::common::TestApp;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Test basic health check endpoint returns 200 OK
#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test health check reports gateway counters
#[tokio::test]
async fn test_health_check_reports_gateway() {
    let app = TestApp::new().await;

    let json = body_json(app.get("/health").await).await;

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["gateway"]["active_connections"], 0);
    assert_eq!(json["gateway"]["active_rooms"], 0);
    assert_eq!(json["gateway"]["heartbeat_running"], true);
}

/// A stopped sweep degrades health
#[tokio::test]
async fn test_health_check_degraded_without_sweep() {
    let app = TestApp::new().await;
    app.state.heartbeat.shutdown();
    while app.state.heartbeat.is_running() {
        tokio::task::yield_now().await;
    }

    let json = body_json(app.get("/health").await).await;

    assert_eq!(json["status"], "degraded");
}

/// Test liveness endpoint
#[tokio::test]
async fn test_liveness_endpoint() {
    let app = TestApp::new().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/health/live").await;

    response.assert_status_ok();
    response.assert_json(&serde_json::json!({"status": "alive"}));
}

/// Metrics are exposed in the Prometheus text format
#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("sync_gateway_"));
}
