//! Health check endpoint

use crate::api::types::HealthResponse;
use axum::Json;

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "pass".to_string(),
    })
}
