//! Prometheus metrics endpoint handler

use axum::response::IntoResponse;

use crate::infrastructure::metrics;
use crate::shared::error::AppError;

pub async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    let body = metrics::gather_metrics().map_err(AppError::Internal)?;
    Ok((
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    ))
}
