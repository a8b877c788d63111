//! Text-completion provider trait for the judging language model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single completion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// Standing instructions (sent as the system message by chat backends).
    pub system: String,
    /// The task prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// A language model reachable as a plain text-completion service.
///
/// The judgment layer assumes nothing about model identity: any backend that
/// turns a prompt into text honors this contract. Implementations report
/// transport and protocol failures as [`RatingError::Completion`](crate::RatingError::Completion)
/// and must not retry on their own.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// A short name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate a completion for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
