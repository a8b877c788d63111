//! Résumé rating pipeline orchestrator.
//!
//! The [`RatingPipeline`] runs one rating request end to end:
//! chunk → embed → retrieve per requirement → judge per requirement → aggregate.
//! Each request builds its own index, so concurrent requests share nothing
//! but the (stateless) providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use ats_rag::{RatingConfig, RatingPipeline, RatingRequest};
//!
//! let pipeline = RatingPipeline::builder()
//!     .config(RatingConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .completion_provider(Arc::new(my_model))
//!     .build()?;
//!
//! let report = pipeline
//!     .rate(&RatingRequest {
//!         resume_text: resume,
//!         requirements: vec!["3+ years backend experience".into()],
//!     })
//!     .await?;
//! println!("{}: {}", report.overall_score(), report.summary().text);
//! ```

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use crate::aggregate::{JudgmentOutcome, MatchReport, ScoreAggregator};
use crate::chunking::{Chunker, ResumeChunker};
use crate::completion::CompletionProvider;
use crate::config::{FailurePolicy, RatingConfig};
use crate::document::{Evidence, RatingRequest, Requirement, ResumeDocument};
use crate::embedding::EmbeddingProvider;
use crate::error::{RatingError, Result};
use crate::index::EmbeddingIndex;
use crate::judgment::JudgmentOrchestrator;
use crate::matcher::RequirementMatcher;

/// The rating pipeline orchestrator.
///
/// Construct one via [`RatingPipeline::builder()`]. A pipeline is cheap to
/// share behind an `Arc` and can serve any number of concurrent requests.
pub struct RatingPipeline {
    config: RatingConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    completion_provider: Arc<dyn CompletionProvider>,
    chunker: Arc<dyn Chunker>,
}

impl RatingPipeline {
    /// Create a new [`RatingPipelineBuilder`].
    pub fn builder() -> RatingPipelineBuilder {
        RatingPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Rate a request received at the boundary.
    ///
    /// # Errors
    ///
    /// See [`rate_document`](Self::rate_document).
    pub async fn rate(&self, request: &RatingRequest) -> Result<MatchReport> {
        let document = ResumeDocument::new(request.resume_text.clone());
        self.rate_document(&document, &request.requirements).await
    }

    /// Rate a résumé against requirement texts given in display order.
    ///
    /// Dropping the returned future abandons every in-flight provider call;
    /// no partial report is ever produced.
    ///
    /// # Errors
    ///
    /// - [`RatingError::EmptyDocument`] before any provider call if the résumé
    ///   has no text.
    /// - [`RatingError::NoRequirements`] if no non-blank requirement is given.
    /// - [`RatingError::EmbeddingProvider`] if indexing or retrieval fails.
    /// - A judgment error, according to the configured [`FailurePolicy`].
    pub async fn rate_document(
        &self,
        document: &ResumeDocument,
        requirements: &[String],
    ) -> Result<MatchReport> {
        // 1. Chunk the résumé
        let chunks = self.chunker.chunk(document).inspect_err(|e| {
            error!(error = %e, "chunking failed");
        })?;
        info!(chunk_count = chunks.len(), "chunked résumé");

        // 2. Number the requirements
        let requirements = Requirement::from_texts(requirements);
        if requirements.is_empty() {
            error!("no requirements supplied");
            return Err(RatingError::NoRequirements);
        }

        // 3. Embed the chunks
        let index = EmbeddingIndex::build(
            self.embedding_provider.clone(),
            chunks,
            self.config.embedding_timeout(),
        )
        .await?;

        // 4. Retrieve evidence per requirement
        let matcher = RequirementMatcher::new(self.config.top_k, self.config.max_concurrency);
        let evidence = matcher.match_requirements(&index, &requirements).await?;

        // 5. Judge each requirement
        let outcomes = self.judge_all(requirements, evidence).await?;

        // 6. Aggregate once every requirement is settled
        let report = ScoreAggregator::new(self.config.weights, self.config.failure_policy)
            .aggregate(outcomes)?;
        info!(
            overall_score = report.overall_score(),
            requirement_count = report.verdicts().len(),
            "rating completed"
        );
        Ok(report)
    }

    /// Rate a request unless `cancel` completes first.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Cancelled`] if `cancel` resolves before the
    /// report is complete; otherwise as [`rate`](Self::rate).
    pub async fn rate_until<F>(&self, request: &RatingRequest, cancel: F) -> Result<MatchReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            report = self.rate(request) => report,
            () = cancel => {
                warn!("rating cancelled; discarding in-flight judgments");
                Err(RatingError::Cancelled)
            }
        }
    }

    /// Judge all requirements with bounded concurrency, in requirement order.
    ///
    /// Under [`FailurePolicy::FailReport`] the first failure stops the
    /// remaining judgments.
    async fn judge_all(
        &self,
        requirements: Vec<Requirement>,
        evidence: Vec<Evidence>,
    ) -> Result<Vec<JudgmentOutcome>> {
        let orchestrator =
            JudgmentOrchestrator::new(self.completion_provider.clone(), &self.config);
        let fail_fast = self.config.failure_policy == FailurePolicy::FailReport;
        let total = requirements.len();

        let orchestrator = &orchestrator;
        let mut judgments = pin!(
            stream::iter(requirements.into_iter().zip(evidence))
                .map(|(requirement, evidence)| async move {
                    let result = orchestrator.judge(&requirement, &evidence).await;
                    JudgmentOutcome { requirement, result }
                })
                .buffered(self.config.max_concurrency)
        );

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = judgments.next().await {
            match outcome {
                JudgmentOutcome { result: Err(error), .. } if fail_fast => return Err(error),
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    }
}

/// Builder for constructing a [`RatingPipeline`].
///
/// Both providers are required. The configuration defaults to
/// [`RatingConfig::default()`] and the chunker to a [`ResumeChunker`] sized
/// from the configuration.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RatingPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .completion_provider(Arc::new(model))
///     .chunker(Arc::new(chunker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RatingPipelineBuilder {
    config: Option<RatingConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RatingPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RatingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the completion provider used for judgments.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Replace the default résumé chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RatingPipeline`], validating the configuration and that
    /// both providers are set.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Config`] if a provider is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RatingPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RatingError::Config("embedding_provider is required".to_string()))?;
        let completion_provider = self
            .completion_provider
            .ok_or_else(|| RatingError::Config("completion_provider is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(ResumeChunker::new(config.chunk_size, config.chunk_overlap)) as Arc<dyn Chunker>
        });

        Ok(RatingPipeline { config, embedding_provider, completion_provider, chunker })
    }
}
