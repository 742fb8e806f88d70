use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::models::chat::CreateSessionRequest;
use crate::services::RouterService;
use crate::utils::error::ApiError;

pub async fn list_sessions_handler(
    State(router): State<Arc<RouterService>>,
) -> Result<Json<Value>, ApiError> {
    let sessions = router.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// Body is optional; `{}` or no body creates an untopiced session
pub async fn create_session_handler(
    State(router): State<Arc<RouterService>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let session = router.create_session(request.topic.as_deref()).await?;

    info!("Session {} created via API", session.id);
    Ok((StatusCode::CREATED, Json(json!({ "session": session }))))
}

pub async fn get_session_handler(
    State(router): State<Arc<RouterService>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = router.get_session(&id).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn delete_session_handler(
    State(router): State<Arc<RouterService>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    router.delete_session(&id).await?;
    Ok(Json(json!({ "message": format!("Session {} deleted", id) })))
}
