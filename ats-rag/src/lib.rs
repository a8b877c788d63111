//! # ats-rag
//!
//! Résumé-against-requirements rating for an applicant tracking system.
//!
//! A résumé is split into overlapping chunks, embedded into a per-request
//! in-memory index, and searched once per requirement. A language model then
//! judges each requirement against only the retrieved excerpts, and the
//! verdicts are aggregated deterministically into a 0–100 score.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ats_rag::ollama::{OllamaCompletionProvider, OllamaEmbeddingProvider};
//! use ats_rag::{RatingPipeline, RatingRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = RatingPipeline::builder()
//!         .embedding_provider(Arc::new(OllamaEmbeddingProvider::from_env()))
//!         .completion_provider(Arc::new(OllamaCompletionProvider::from_env()))
//!         .build()?;
//!
//!     let report = pipeline
//!         .rate(&RatingRequest {
//!             resume_text: std::fs::read_to_string("resume.txt")?,
//!             requirements: vec!["3+ years backend experience".into()],
//!         })
//!         .await?;
//!     println!("{} {}", report.overall_score(), report.summary().text);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `ollama` – HTTP providers for a local Ollama server.
//! - `openai` – HTTP providers for OpenAI-compatible APIs.
//! - `pdf` – `ResumeDocument::from_pdf` for PDF résumé uploads.
//! - `full` – all of the above.

pub mod aggregate;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod judgment;
pub mod matcher;
pub mod pipeline;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pdf")]
pub mod pdf;

pub use aggregate::{JudgmentOutcome, MatchReport, ReportSummary, ScoreAggregator};
pub use chunking::{Chunker, ResumeChunker, collapse_whitespace, normalize_text};
pub use completion::{CompletionProvider, CompletionRequest};
pub use config::{FailurePolicy, RatingConfig, RatingConfigBuilder, ScoreWeights};
pub use document::{
    Chunk, Evidence, RatingRequest, Requirement, ResumeDocument, SearchResult, SourceMetadata,
};
pub use embedding::EmbeddingProvider;
pub use error::{RatingError, Result};
pub use index::{EmbeddingIndex, cosine_similarity};
pub use judgment::{JudgmentOrchestrator, MatchLevel, Verdict};
pub use matcher::RequirementMatcher;
pub use pipeline::{RatingPipeline, RatingPipelineBuilder};
