use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Settings;
use crate::services::RouterService;

#[derive(Serialize)]
pub struct ApiInfo {
    name: String,
    version: String,
    endpoints: Vec<&'static str>,
    models: Value,
}

pub async fn api_info(State(settings): State<Arc<Settings>>) -> Json<ApiInfo> {
    Json(ApiInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "GET /health",
            "GET /api/models",
            "POST /api/chat",
            "POST /api/chat/stream",
            "GET /api/sessions",
            "POST /api/sessions",
            "GET /api/sessions/{id}",
            "DELETE /api/sessions/{id}",
            "GET /ws",
        ],
        models: json!({
            "code": settings.models.code_model,
            "large": settings.models.large_model,
            "default": settings.models.default_model,
        }),
    })
}

pub async fn list_models_handler(State(router): State<Arc<RouterService>>) -> Json<Value> {
    let models = router.list_models().await;
    Json(json!({ "models": models }))
}
