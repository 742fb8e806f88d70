use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::models::chat::{ChatEvent, ChatRequest, ChatResponse, Session, Topic};
use crate::services::conversation::{
    ContextBuilder, ContextCompressor, KeywordClassifier, ModelSelector, QueryClassifier,
    SessionCache,
};
use crate::services::llm_service::{FragmentStream, GenerationClient};
use crate::services::stream_relay::StreamRelay;
use crate::utils::error::RouterError;

/// Everything needed to run one generation, with the user turn recorded
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub session: Session,
    pub model: String,
    pub prompt: String,
    pub topic: Topic,
}

/// Public entry point of the routing core
#[derive(Clone)]
pub struct RouterService {
    cache: Arc<SessionCache>,
    classifier: Arc<dyn QueryClassifier>,
    selector: ModelSelector,
    builder: Arc<ContextBuilder>,
    client: Arc<dyn GenerationClient>,
    relay: StreamRelay,
}

impl RouterService {
    pub fn new(
        cache: Arc<SessionCache>,
        classifier: Arc<dyn QueryClassifier>,
        selector: ModelSelector,
        builder: ContextBuilder,
        client: Arc<dyn GenerationClient>,
    ) -> Self {
        let relay = StreamRelay::new(Arc::clone(&cache), Arc::clone(&client));
        Self {
            cache,
            classifier,
            selector,
            builder: Arc::new(builder),
            client,
            relay,
        }
    }

    /// Wire the default components from configuration
    pub fn from_settings(
        settings: &Settings,
        cache: Arc<SessionCache>,
        client: Arc<dyn GenerationClient>,
    ) -> Self {
        let builder = ContextBuilder::new(
            ContextCompressor::new(settings.cache.chars_per_token),
            settings.cache.max_context_tokens,
        )
        .with_prompt_overrides(&settings.prompts);

        Self::new(
            cache,
            Arc::new(KeywordClassifier::from_rules(&settings.classifier.rules)),
            ModelSelector::new(settings.models.clone()),
            builder,
            client,
        )
        .with_stream_idle_timeout(Duration::from_secs(settings.ollama.timeout_seconds.max(1)))
    }

    /// Streams have no overall deadline, only this gap between fragments
    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.relay = self.relay.with_idle_timeout(idle);
        self
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn validate(request: &ChatRequest) -> Result<(), RouterError> {
        if request.query.trim().is_empty() {
            return Err(RouterError::Validation("query is required".to_string()));
        }
        if request.session_id.trim().is_empty() {
            return Err(RouterError::Validation("sessionId is required".to_string()));
        }
        Ok(())
    }

    /// Classify, pick a model, build the prompt from prior history, then
    /// record the user turn.
    pub async fn process_request(&self, request: &ChatRequest) -> Result<PreparedRequest, RouterError> {
        Self::validate(request)?;

        let cached = self.cache.get_or_create(&request.session_id).await?;
        let topic = self.classifier.classify(&request.query, cached.session.topic);
        let model = self.selector.resolve(
            request.model.as_deref(),
            topic,
            request.query.chars().count(),
        );
        let prompt = self
            .builder
            .build_prompt(&request.query, &cached.session.messages, topic);

        let updated = self
            .cache
            .append_user_turn(&request.session_id, &request.query, topic)
            .await?;

        debug!(
            "Prepared request for {}: topic={}, model={}, prompt={} chars",
            request.session_id,
            topic,
            model,
            prompt.len()
        );

        Ok(PreparedRequest {
            session: updated.session,
            model,
            prompt,
            topic,
        })
    }

    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, RouterError> {
        self.client.generate(model, prompt).await
    }

    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream, RouterError> {
        self.client.generate_stream(model, prompt).await
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RouterError> {
        let prepared = self.process_request(request).await?;
        self.complete(&prepared).await
    }

    /// One-shot generation for an already prepared request
    pub async fn complete(&self, prepared: &PreparedRequest) -> Result<ChatResponse, RouterError> {
        self.relay
            .respond(&prepared.session.id, &prepared.model, &prepared.prompt)
            .await
    }

    /// Streaming exchange. Request errors come back before any event;
    /// generation errors arrive as an `error` event on the channel.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<mpsc::Receiver<ChatEvent>, RouterError> {
        let prepared = self.process_request(request).await?;
        Ok(self
            .relay
            .spawn(prepared.session.id, prepared.model, prepared.prompt))
    }

    pub async fn get_session(&self, id: &str) -> Result<Session, RouterError> {
        self.cache
            .get(id)
            .await?
            .ok_or_else(|| RouterError::NotFound(format!("Session {} not found", id)))
    }

    pub async fn create_session(&self, topic: Option<&str>) -> Result<Session, RouterError> {
        let topic = topic
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<Topic>().map_err(RouterError::Validation))
            .transpose()?;

        self.cache.create(topic).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), RouterError> {
        self.cache.delete(id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, RouterError> {
        self.cache.list().await
    }

    /// Backend model names; empty when the backend can't be reached
    pub async fn list_models(&self) -> Vec<String> {
        match self.client.list_models().await {
            Ok(models) => {
                info!("Backend reports {} models", models.len());
                models
            }
            Err(e) => {
                warn!("Failed to list models: {}", e);
                Vec::new()
            }
        }
    }
}
