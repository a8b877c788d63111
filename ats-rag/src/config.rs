//! Configuration for the rating pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RatingError, Result};

/// Score contribution of each match level.
///
/// The defaults (`1.0 / 0.5 / 0.0`) are a starting point, not a contract;
/// callers with a different notion of "partial" can tune them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    /// Weight of a `STRONG` verdict.
    pub strong: f64,
    /// Weight of a `PARTIAL` verdict.
    pub partial: f64,
    /// Weight of a `NONE` verdict.
    pub none: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { strong: 1.0, partial: 0.5, none: 0.0 }
    }
}

impl ScoreWeights {
    fn validate(&self) -> Result<()> {
        for (name, w) in [("strong", self.strong), ("partial", self.partial), ("none", self.none)] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(RatingError::Config(format!(
                    "weight '{name}' ({w}) must be within [0, 1]"
                )));
            }
        }
        if self.strong < self.partial || self.partial < self.none {
            return Err(RatingError::Config(
                "weights must satisfy strong >= partial >= none".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happens to the report when a single requirement cannot be judged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole report with the first failed requirement's error.
    #[default]
    FailReport,
    /// Keep the report, marking failed requirements `UNKNOWN` and leaving
    /// them out of the score.
    MarkUnknown,
}

/// Configuration parameters for the rating pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RatingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of evidence chunks retrieved per requirement.
    pub top_k: usize,
    /// Sampling temperature passed to the model. `0.0` makes match levels
    /// reproducible on providers that honor it.
    pub temperature: f32,
    /// Upper bound on tokens generated per judgment.
    pub max_tokens: u32,
    /// Maximum number of concurrent provider calls per request.
    pub max_concurrency: usize,
    /// Timeout for a single embedding call, in seconds.
    pub embedding_timeout_secs: u64,
    /// Timeout for a single completion call, in seconds.
    pub completion_timeout_secs: u64,
    /// Score contribution of each match level.
    pub weights: ScoreWeights,
    /// How failed requirement judgments are reported.
    pub failure_policy: FailurePolicy,
    /// Language the model writes its rationale in.
    pub response_language: String,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 72,
            top_k: 4,
            temperature: 0.0,
            max_tokens: 512,
            max_concurrency: 4,
            embedding_timeout_secs: 30,
            completion_timeout_secs: 120,
            weights: ScoreWeights::default(),
            failure_policy: FailurePolicy::default(),
            response_language: "English".to_string(),
        }
    }
}

impl RatingConfig {
    /// Create a new builder for constructing a [`RatingConfig`].
    pub fn builder() -> RatingConfigBuilder {
        RatingConfigBuilder::default()
    }

    /// Timeout applied to each embedding call.
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    /// Timeout applied to each completion call.
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RatingError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RatingError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RatingError::Config("top_k must be greater than zero".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(RatingError::Config(format!(
                "temperature ({}) must be within [0, 2]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(RatingError::Config("max_tokens must be greater than zero".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(RatingError::Config(
                "max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.embedding_timeout_secs == 0 || self.completion_timeout_secs == 0 {
            return Err(RatingError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.response_language.trim().is_empty() {
            return Err(RatingError::Config("response_language must not be empty".to_string()));
        }
        self.weights.validate()
    }
}

/// Builder for constructing a validated [`RatingConfig`].
#[derive(Debug, Clone, Default)]
pub struct RatingConfigBuilder {
    config: RatingConfig,
}

impl RatingConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of evidence chunks retrieved per requirement.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the model sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the token limit per judgment.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the number of concurrent provider calls per request.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    /// Set the per-call embedding timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the per-call completion timeout.
    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.config.completion_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the match level weights.
    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Set the failure policy.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Set the language of the model's rationale.
    pub fn response_language(mut self, language: impl Into<String>) -> Self {
        self.config.response_language = language.into();
        self
    }

    /// Build the [`RatingConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `max_tokens`, `max_concurrency` or a timeout is zero
    /// - `temperature` is outside `[0, 2]`
    /// - the weights are outside `[0, 1]` or not ordered strong ≥ partial ≥ none
    pub fn build(self) -> Result<RatingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
