use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OllamaConfig;
use crate::utils::error::RouterError;

/// One incremental piece of generated text
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, RouterError>> + Send>>;

/// Text generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Full response in one piece
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, RouterError>;

    /// Lazy fragment stream. Items that fail to decode come through as
    /// `RouterError::StreamIntegrity` and the stream keeps going.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream, RouterError>;

    async fn list_models(&self) -> Result<Vec<String>, RouterError>;
}

// ===== OLLAMA WIRE TYPES =====

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Splits a byte stream into newline-delimited JSON objects.
///
/// Lines may arrive split across network chunks; bytes are buffered until a
/// full line is available, so multi-byte characters are never cut.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, get back every complete line decoded
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Fragment, RouterError>> {
        self.buffer.extend_from_slice(bytes);

        let mut decoded = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                decoded.push(item);
            }
        }
        decoded
    }

    /// Decode whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Option<Result<Fragment, RouterError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<Result<Fragment, RouterError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<GenerateChunk>(text) {
        Ok(GenerateChunk {
            error: Some(error), ..
        }) => Some(Err(RouterError::Backend(error))),
        Ok(chunk) => Some(Ok(Fragment::new(chunk.response, chunk.done))),
        Err(e) => {
            let preview: String = text.chars().take(100).collect();
            Some(Err(RouterError::StreamIntegrity(format!(
                "{} (line: {:?})",
                e, preview
            ))))
        }
    }
}

/// Turn a raw NDJSON byte stream into fragments
pub fn fragment_stream(
    bytes_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> FragmentStream {
    let stream = async_stream::stream! {
        let mut bytes_stream = Box::pin(bytes_stream);
        let mut decoder = NdjsonDecoder::new();

        while let Some(chunk) = bytes_stream.next().await {
            match chunk {
                Ok(chunk) => {
                    for item in decoder.push(&chunk) {
                        yield item;
                    }
                }
                Err(e) => {
                    yield Err(RouterError::Backend(format!("Stream error: {}", e)));
                    return;
                }
            }
        }

        if let Some(item) = decoder.finish() {
            yield item;
        }
    };

    Box::pin(stream)
}

// ===== OLLAMA CLIENT =====

#[derive(Clone)]
pub struct OllamaService {
    client: Client,
    config: OllamaConfig,
}

impl OllamaService {
    pub fn new(config: OllamaConfig) -> Result<Self, RouterError> {
        // No overall timeout on the client: streamed bodies can run long.
        // One-shot calls set their own.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        info!("Ollama client targeting {}", config.base_url);
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    async fn post_generate(
        &self,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, RouterError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        };

        let mut builder = self.client.post(self.url("/api/generate")).json(&request);
        if !stream {
            builder = builder.timeout(self.request_timeout());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RouterError::Backend(format!("Failed to call Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::Backend(format!(
                "Ollama API error: {} - {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationClient for OllamaService {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, RouterError> {
        debug!("Generating with {} ({} prompt chars)", model, prompt.len());

        let response = self.post_generate(model, prompt, false).await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| RouterError::Backend(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(RouterError::Backend(error));
        }
        Ok(chunk.response)
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream, RouterError> {
        debug!("Streaming with {} ({} prompt chars)", model, prompt.len());

        let response = self.post_generate(model, prompt, true).await?;
        Ok(fragment_stream(response.bytes_stream()))
    }

    async fn list_models(&self) -> Result<Vec<String>, RouterError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Ollama tags request failed: {}", status);
            return Err(RouterError::Backend(format!("Ollama API error: {}", status)));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
