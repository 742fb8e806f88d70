use crate::models::chat::*;
use crate::services::RouterService;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// One-shot chat; answers with the `complete` event
pub async fn chat_handler(
    State(router): State<Arc<RouterService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatEvent>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let start_time = Instant::now();

    info!(
        "Chat request: session={}, query_len={}, model={:?}",
        request.session_id,
        request.query.len(),
        request.model
    );

    let response = router.chat(&request).await?;

    info!(
        "Chat completed for {} in {}ms",
        response.session_id,
        start_time.elapsed().as_millis()
    );
    Ok(Json(ChatEvent::from(response)))
}

/// Streaming chat over SSE. Each event is a bare `data:` frame carrying one
/// `ChatEvent` as JSON.
pub async fn chat_stream_handler(
    State(router): State<Arc<RouterService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    info!(
        "Chat stream request: session={}, query_len={}, model={:?}",
        request.session_id,
        request.query.len(),
        request.model
    );

    let mut events = router.chat_stream(&request).await?;

    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            yield Ok(create_sse_event(&event));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn create_sse_event(event: &ChatEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()))
}
