use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::chat::{ChatEvent, ChatResponse, SessionId};
use crate::services::conversation::SessionCache;
use crate::services::llm_service::GenerationClient;
use crate::utils::error::RouterError;

const EVENT_BUFFER: usize = 64;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives a generation and turns it into the client-facing event sequence:
/// `started`, zero or more `chunk`, then exactly one of `complete` or `error`.
///
/// The assistant turn is recorded once the whole fragment stream has been
/// drained, before `complete` goes out. A backend that goes quiet for
/// longer than the idle timeout ends the sequence with `error`.
#[derive(Clone)]
pub struct StreamRelay {
    cache: Arc<SessionCache>,
    client: Arc<dyn GenerationClient>,
    idle_timeout: Duration,
}

impl StreamRelay {
    pub fn new(cache: Arc<SessionCache>, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            cache,
            client,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Longest gap allowed between two fragments
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn events(
        &self,
        session_id: SessionId,
        model: String,
        prompt: String,
    ) -> impl Stream<Item = ChatEvent> + Send + 'static {
        let cache = Arc::clone(&self.cache);
        let client = Arc::clone(&self.client);
        let idle = self.idle_timeout;

        async_stream::stream! {
            yield ChatEvent::Started {
                session_id: session_id.clone(),
                model: model.clone(),
            };

            let mut fragments = match client.generate_stream(&model, &prompt).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    error!("Generation failed to start for {}: {}", session_id, e);
                    yield ChatEvent::error(e);
                    return;
                }
            };

            let mut full_response = String::new();
            let mut chunks = 0usize;

            loop {
                let item = match tokio::time::timeout(idle, fragments.next()).await {
                    Ok(Some(item)) => item,
                    Ok(None) => break,
                    Err(_) => {
                        warn!("{} went quiet for {:?}, abandoning generation for {}", model, idle, session_id);
                        yield ChatEvent::error(RouterError::Backend(format!(
                            "no output from model for {:?}",
                            idle
                        )));
                        return;
                    }
                };
                match item {
                    Ok(fragment) => {
                        if fragment.text.is_empty() {
                            continue;
                        }
                        full_response.push_str(&fragment.text);
                        chunks += 1;
                        yield ChatEvent::Chunk {
                            chunk: fragment.text,
                            model: model.clone(),
                            done: fragment.is_final,
                        };
                    }
                    Err(RouterError::StreamIntegrity(msg)) => {
                        warn!("Dropping malformed fragment for {}: {}", session_id, msg);
                    }
                    Err(e) => {
                        error!("Generation failed mid-stream for {}: {}", session_id, e);
                        yield ChatEvent::error(e);
                        return;
                    }
                }
            }

            if let Err(e) = cache
                .append_assistant_turn(&session_id, &full_response, &model)
                .await
            {
                error!("Failed to record answer for {}: {}", session_id, e);
                yield ChatEvent::error(e);
                return;
            }

            info!(
                "Streamed {} chunks ({} chars) from {} for {}",
                chunks,
                full_response.len(),
                model,
                session_id
            );
            yield ChatEvent::completed(session_id);
        }
    }

    /// Run the event sequence on its own task.
    ///
    /// If the receiver is dropped the task keeps draining the generation so
    /// the answer still lands in the session; it ends with the backend stream
    /// or when the backend stalls past the idle timeout.
    pub fn spawn(
        &self,
        session_id: SessionId,
        model: String,
        prompt: String,
    ) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let events = self.events(session_id.clone(), model, prompt);

        tokio::spawn(async move {
            let mut events = std::pin::pin!(events);
            let mut connected = true;

            while let Some(event) = events.next().await {
                if connected && tx.send(event).await.is_err() {
                    connected = false;
                    debug!(
                        "Client for {} went away, finishing generation in background",
                        session_id
                    );
                }
            }
        });

        rx
    }

    /// One-shot generation
    pub async fn respond(
        &self,
        session_id: &str,
        model: &str,
        prompt: &str,
    ) -> Result<ChatResponse, RouterError> {
        let response = self.client.generate(model, prompt).await?;
        self.cache
            .append_assistant_turn(session_id, &response, model)
            .await?;

        info!(
            "Generated {} chars from {} for {}",
            response.len(),
            model,
            session_id
        );
        Ok(ChatResponse {
            response,
            model: model.to_string(),
            session_id: session_id.to_string(),
        })
    }
}
