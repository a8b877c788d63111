//! Error types for the `ats-rag` crate.

use thiserror::Error;

/// Errors that can occur while rating a résumé.
///
/// Requirement-scoped variants carry the requirement id and the evidence
/// chunk ids that were handed to the model, so a failure can be reproduced
/// without re-running the whole pipeline.
#[derive(Debug, Error)]
pub enum RatingError {
    /// The résumé is empty or has no extractable text after normalization.
    #[error("Empty document: the résumé contains no extractable text")]
    EmptyDocument,

    /// Text could not be extracted from an uploaded résumé file.
    #[error("Extraction error ({filename}): {message}")]
    Extraction {
        /// The file being read, or `"<memory>"` when unnamed.
        filename: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider failed or returned a malformed vector.
    #[error("Embedding provider error ({provider}): {message}")]
    EmbeddingProvider {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A raw completion-provider failure not yet attributed to a requirement.
    #[error("Completion error ({provider}): {message}")]
    Completion {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model could not be reached, failed, or timed out while
    /// judging a requirement.
    #[error("Model unavailable for requirement {requirement_id} (evidence {evidence_ids:?}): {message}")]
    ModelUnavailable {
        /// The requirement being judged.
        requirement_id: String,
        /// The chunk ids supplied as evidence.
        evidence_ids: Vec<String>,
        /// A description of the failure.
        message: String,
    },

    /// The model answered twice without a recognizable match level.
    #[error("Unparsable judgment for requirement {requirement_id} (evidence {evidence_ids:?}): {response:?}")]
    UnparsableJudgment {
        /// The requirement being judged.
        requirement_id: String,
        /// The chunk ids supplied as evidence.
        evidence_ids: Vec<String>,
        /// The last raw model response.
        response: String,
    },

    /// No requirements were supplied, so the score is undefined.
    #[error("No requirements supplied: the match score is undefined")]
    NoRequirements,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The rating request was cancelled before the report was complete.
    #[error("Rating cancelled")]
    Cancelled,
}

impl RatingError {
    /// The requirement this error is scoped to, if any.
    pub fn requirement_id(&self) -> Option<&str> {
        match self {
            Self::ModelUnavailable { requirement_id, .. }
            | Self::UnparsableJudgment { requirement_id, .. } => Some(requirement_id),
            _ => None,
        }
    }
}

/// A convenience result type for rating operations.
pub type Result<T> = std::result::Result<T, RatingError>;
