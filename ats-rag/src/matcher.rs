//! Retrieval of résumé evidence for each requirement.

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::document::{Evidence, Requirement};
use crate::error::{RatingError, Result};
use crate::index::EmbeddingIndex;

/// Retrieves the top-k résumé chunks for every requirement.
///
/// Each requirement is queried independently; up to `max_concurrency`
/// queries are in flight at once. Results come back in requirement order
/// regardless of completion order.
#[derive(Debug, Clone, Copy)]
pub struct RequirementMatcher {
    top_k: usize,
    max_concurrency: usize,
}

impl RequirementMatcher {
    /// Create a matcher retrieving `top_k` chunks per requirement.
    pub fn new(top_k: usize, max_concurrency: usize) -> Self {
        Self { top_k, max_concurrency: max_concurrency.max(1) }
    }

    /// Number of chunks retrieved per requirement.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve evidence for every requirement.
    ///
    /// Returns one [`Evidence`] per requirement, in the same order. An index
    /// with fewer than `top_k` chunks yields all of them.
    ///
    /// # Errors
    ///
    /// Returns the first embedding failure; the remaining queries are dropped.
    pub async fn match_requirements(
        &self,
        index: &EmbeddingIndex,
        requirements: &[Requirement],
    ) -> Result<Vec<Evidence>> {
        let top_k = self.top_k;
        let evidence: Vec<Evidence> = stream::iter(requirements)
            .map(|requirement| async move {
                let evidence = index.query(requirement, top_k).await?;
                debug!(
                    requirement.id = %requirement.id,
                    evidence = ?evidence.chunk_ids(),
                    "retrieved evidence"
                );
                Ok::<_, RatingError>(evidence)
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        info!(requirement_count = evidence.len(), top_k, "matched requirements");
        Ok(evidence)
    }
}
