use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `GET /health`
pub(crate) async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}
