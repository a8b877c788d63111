//! The embedding seam between the rating pipeline and a vector model.

use async_trait::async_trait;

use crate::error::Result;

/// Turns résumé chunks and requirement texts into fixed-length vectors.
///
/// The index only ever compares vectors from the same provider, so the
/// provider defines the vector space. Every vector it returns must have
/// exactly [`dimensions`](Self::dimensions) finite components and must not
/// be all zeros; [`EmbeddingIndex`](crate::EmbeddingIndex) rejects anything
/// else with [`RatingError::EmbeddingProvider`](crate::RatingError::EmbeddingProvider).
///
/// Inputs arrive whitespace-collapsed.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::EmbeddingProvider;
///
/// let vector = provider.embed("led a team of 4 engineers").await?;
/// assert_eq!(vector.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider label for logs and error messages.
    fn name(&self) -> &str;

    /// Embed one text, typically a requirement.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed all chunks of a résumé, returning one vector per input in input
    /// order.
    ///
    /// Falls back to one [`embed`](Self::embed) call per text. Backends with a
    /// batch endpoint override this so a résumé costs a single round trip.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;
}
