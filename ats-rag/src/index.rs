//! Per-request embedding index with cosine-similarity search.
//!
//! [`EmbeddingIndex`] embeds every chunk of one résumé once, at build time,
//! and answers top-k queries against those vectors. It is immutable after
//! [`build`](EmbeddingIndex::build): a different résumé needs a fresh index,
//! so nothing is shared between rating requests and no locking is needed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::chunking::collapse_whitespace;
use crate::document::{Chunk, Evidence, Requirement, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RatingError, Result};

/// An immutable in-memory index over the chunks of a single résumé.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::EmbeddingIndex;
///
/// let index = EmbeddingIndex::build(provider, chunks, Duration::from_secs(30)).await?;
/// let evidence = index.query(&requirement, 4).await?;
/// ```
pub struct EmbeddingIndex {
    chunks: Vec<Chunk>,
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("chunks", &self.chunks.len())
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmbeddingIndex {
    /// Embed `chunks` and build the index.
    ///
    /// Chunk texts are whitespace-collapsed before embedding. Every call to
    /// the provider is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::EmbeddingProvider`] if the provider fails, times
    /// out, returns the wrong number of vectors, or returns a vector that is
    /// the wrong length, non-finite, or all zeros.
    pub async fn build(
        provider: Arc<dyn EmbeddingProvider>,
        mut chunks: Vec<Chunk>,
        timeout: Duration,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Ok(Self { chunks, provider, timeout });
        }

        let normalized: Vec<String> = chunks.iter().map(|c| collapse_whitespace(&c.text)).collect();
        let texts: Vec<&str> = normalized.iter().map(String::as_str).collect();

        debug!(provider = provider.name(), batch_size = texts.len(), "embedding résumé chunks");
        let embeddings =
            bounded(provider.name(), timeout, provider.embed_batch(&texts)).await?;

        if embeddings.len() != chunks.len() {
            error!(
                provider = provider.name(),
                expected = chunks.len(),
                actual = embeddings.len(),
                "embedding batch size mismatch"
            );
            return Err(RatingError::EmbeddingProvider {
                provider: provider.name().to_string(),
                message: format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let dimensions = provider.dimensions();
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            check_vector(provider.name(), dimensions, &embedding)?;
            chunk.embedding = embedding;
        }

        info!(provider = provider.name(), chunk_count = chunks.len(), dimensions, "index built");
        Ok(Self { chunks, provider, timeout })
    }

    /// The indexed chunks, in document order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Retrieve the `k` chunks most similar to the requirement text.
    ///
    /// Returns fewer than `k` results when the index is smaller. Results are
    /// ordered by descending cosine similarity; ties go to the chunk that
    /// appears earlier in the résumé.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::EmbeddingProvider`] if embedding the query fails
    /// or yields a malformed vector.
    pub async fn query(&self, requirement: &Requirement, k: usize) -> Result<Evidence> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Evidence { requirement_id: requirement.id.clone(), results: Vec::new() });
        }

        let query_text = collapse_whitespace(&requirement.text);
        let query = bounded(self.provider.name(), self.timeout, self.provider.embed(&query_text))
            .await
            .inspect_err(|e| {
                error!(requirement.id = %requirement.id, error = %e, "query embedding failed");
            })?;
        check_vector(self.provider.name(), self.provider.dimensions(), &query)?;

        Ok(Evidence { requirement_id: requirement.id.clone(), results: self.rank(&query, k) })
    }

    /// Rank all chunks against an already-embedded query.
    fn rank(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<SearchResult> = self
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: cosine_similarity(&chunk.embedding, query),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| a.chunk.position.cmp(&b.chunk.position))
        });
        scored.truncate(k);
        scored
    }
}

/// Run a provider call under `timeout`, mapping expiry to an embedding error.
async fn bounded<T>(
    provider: &str,
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            error!(provider, ?timeout, "embedding call timed out");
            Err(RatingError::EmbeddingProvider {
                provider: provider.to_string(),
                message: format!("timed out after {timeout:?}"),
            })
        }
    }
}

/// Reject vectors that would silently corrupt similarity ranking.
fn check_vector(provider: &str, dimensions: usize, vector: &[f32]) -> Result<()> {
    let problem = if vector.len() != dimensions {
        Some(format!("expected {dimensions} dimensions, received {}", vector.len()))
    } else if vector.iter().any(|x| !x.is_finite()) {
        Some("embedding contains non-finite values".to_string())
    } else if vector.iter().all(|x| *x == 0.0) {
        Some("embedding is a zero vector".to_string())
    } else {
        None
    };

    match problem {
        Some(message) => {
            error!(provider, %message, "malformed embedding");
            Err(RatingError::EmbeddingProvider { provider: provider.to_string(), message })
        }
        None => Ok(()),
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude; the result is clamped to
/// `[-1, 1]` to absorb rounding. Never returns `-0.0`, so equal similarities
/// compare equal under `total_cmp`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    // `+ 0.0` turns a negative zero into a positive one.
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) + 0.0
}
