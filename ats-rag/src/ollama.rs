//! Ollama embedding and chat-completion providers.
//!
//! This module is only available when the `ollama` feature is enabled. Both
//! providers talk to a local Ollama server over HTTP using `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::{RatingError, Result};

/// The default Ollama server address.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "openhermes";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

const PROVIDER: &str = "Ollama";

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Turn a non-success response into a readable message.
async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")
///     .with_model("mxbai-embed-large", 1024);
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the server at `host` using `nomic-embed-text`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Create a provider using the `OLLAMA_HOST` environment variable, or
    /// the default local address.
    pub fn from_env() -> Self {
        Self::new(std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()))
    }

    /// Set the embedding model and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

fn embedding_error(message: String) -> RatingError {
    RatingError::EmbeddingProvider { provider: PROVIDER.into(), message }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(endpoint(&self.host, "api/embed"))
            .json(&EmbedRequest { model: &self.model, input: texts.to_vec() })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = failure_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(embedding_error(message));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            embedding_error(format!("failed to parse response: {e}"))
        })?;

        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completion ────────────────────────────────────────────────

/// A [`CompletionProvider`] backed by Ollama's non-streaming `/api/chat`.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::ollama::OllamaCompletionProvider;
///
/// let model = OllamaCompletionProvider::from_env().with_model("llama3.1");
/// ```
pub struct OllamaCompletionProvider {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaCompletionProvider {
    /// Create a provider for the server at `host` using `openhermes`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), host: host.into(), model: DEFAULT_CHAT_MODEL.into() }
    }

    /// Create a provider using the `OLLAMA_HOST` environment variable, or
    /// the default local address.
    pub fn from_env() -> Self {
        Self::new(std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()))
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn chat_request<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage { role: "system", content: &request.system },
            ChatMessage { role: "user", content: &request.prompt },
        ],
        stream: false,
        options: ChatOptions { temperature: request.temperature, num_predict: request.max_tokens },
    }
}

fn completion_error(message: String) -> RatingError {
    RatingError::Completion { provider: PROVIDER.into(), message }
}

#[async_trait]
impl CompletionProvider for OllamaCompletionProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, "chat completion");

        let response = self
            .client
            .post(endpoint(&self.host, "api/chat"))
            .json(&chat_request(&self.model, request))
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                completion_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = failure_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(completion_error(message));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            completion_error(format!("failed to parse response: {e}"))
        })?;

        Ok(body.message.content)
    }
}
