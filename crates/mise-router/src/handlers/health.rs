use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::RouterService;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    version: String,
    cached_sessions: usize,
    timestamp: chrono::DateTime<chrono::Utc>,
}

pub async fn health_check(
    State(router): State<Arc<RouterService>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cached_sessions: router.cache().len(),
            timestamp: chrono::Utc::now(),
        }),
    )
}
