//! OpenAI-compatible embedding and chat-completion providers.
//!
//! This module is only available when the `openai` feature is enabled. The
//! base URL is configurable, so the same providers work against OpenAI and
//! against local servers exposing the same API (vLLM, llama.cpp, LM Studio).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::{RatingError, Result};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

/// Connection settings shared by both providers.
#[derive(Clone)]
struct Connection {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Connection {
    fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RatingError::Config(
            "OPENAI_API_KEY environment variable not set".into(),
        ))?;
        Ok(Self::new(OPENAI_BASE_URL, Some(api_key)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}/{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let local = OpenAIEmbeddingProvider::compatible("http://localhost:8000/v1", None)
///     .with_model("bge-small-en", 384);
/// ```
pub struct OpenAIEmbeddingProvider {
    connection: Connection,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the OpenAI API with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Config`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RatingError::Config("API key must not be empty".into()));
        }
        Ok(Self::with_connection(Connection::new(OPENAI_BASE_URL, Some(api_key))))
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_connection(Connection::from_env()?))
    }

    /// Create a provider for any server implementing the OpenAI embeddings API.
    pub fn compatible(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_connection(Connection::new(base_url, api_key))
    }

    fn with_connection(connection: Connection) -> Self {
        Self {
            connection,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    /// Set the model name and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Request truncated output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

fn embedding_error(message: String) -> RatingError {
    RatingError::EmbeddingProvider { provider: PROVIDER.into(), message }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
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

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response =
            self.connection.post("embeddings").json(&request_body).send().await.map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = failure_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(embedding_error(message));
        }

        let mut body: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            embedding_error(format!("failed to parse response: {e}"))
        })?;

        // The API documents `index`; don't rely on array order.
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completion ────────────────────────────────────────────────

/// A [`CompletionProvider`] backed by an OpenAI-compatible `/chat/completions`
/// endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::openai::OpenAIChatProvider;
///
/// let model = OpenAIChatProvider::compatible("http://localhost:8080/v1", None)
///     .with_model("qwen2.5-7b-instruct");
/// ```
pub struct OpenAIChatProvider {
    connection: Connection,
    model: String,
}

impl OpenAIChatProvider {
    /// Create a provider for the OpenAI API with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Config`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RatingError::Config("API key must not be empty".into()));
        }
        Ok(Self {
            connection: Connection::new(OPENAI_BASE_URL, Some(api_key)),
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self { connection: Connection::from_env()?, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Create a provider for any server implementing the chat completions API.
    pub fn compatible(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { connection: Connection::new(base_url, api_key), model: DEFAULT_CHAT_MODEL.into() }
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn completion_error(message: String) -> RatingError {
    RatingError::Completion { provider: PROVIDER.into(), message }
}

#[async_trait]
impl CompletionProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, "chat completion");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response =
            self.connection.post("chat/completions").json(&body).send().await.map_err(|e| {
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

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| completion_error("API returned no message content".into()))
    }
}
