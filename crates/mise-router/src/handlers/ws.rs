use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::chat::{ChatEvent, ChatRequest};
use crate::services::RouterService;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(router): State<Arc<RouterService>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, router))
}

/// Requests on one connection are handled in arrival order
async fn handle_socket(socket: WebSocket, router: Arc<RouterService>) {
    let (mut sender, mut receiver) = socket.split();
    info!("WebSocket client connected");

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) = handle_text(&router, &mut sender, text.as_str()).await {
                    debug!("Client went away mid-response: {}", e);
                    break;
                }
            }
            Message::Binary(_) => debug!("Binary frame ignored"),
            Message::Close(_) => break,
            // axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    info!("WebSocket client disconnected");
}

/// Answer one text frame. Only a failed send is an error; request failures
/// go back to the client as `error` events.
async fn handle_text<S>(router: &RouterService, sender: &mut S, text: &str) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let request: ChatRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed WebSocket frame: {}", e);
            return send_event(sender, &ChatEvent::error(format!("Invalid request: {}", e))).await;
        }
    };

    if request.stream.unwrap_or(true) {
        let mut events = match router.chat_stream(&request).await {
            Ok(events) => events,
            Err(e) => return send_event(sender, &ChatEvent::error(e)).await,
        };

        // Dropping `events` on a send failure leaves the generation to finish
        // in the background.
        while let Some(event) = events.recv().await {
            send_event(sender, &event).await?;
        }
        return Ok(());
    }

    let prepared = match router.process_request(&request).await {
        Ok(prepared) => prepared,
        Err(e) => return send_event(sender, &ChatEvent::error(e)).await,
    };

    send_event(
        sender,
        &ChatEvent::Started {
            session_id: prepared.session.id.clone(),
            model: prepared.model.clone(),
        },
    )
    .await?;

    let event = match router.complete(&prepared).await {
        Ok(response) => ChatEvent::from(response),
        Err(e) => ChatEvent::error(e),
    };
    send_event(sender, &event).await
}

async fn send_event<S>(sender: &mut S, event: &ChatEvent) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    sender.send(Message::Text(text.into())).await
}
