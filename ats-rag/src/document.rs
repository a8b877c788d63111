//! Data types for résumés, requirements, chunks, and retrieved evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a résumé came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMetadata {
    /// Original file name, if the résumé was uploaded as a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// When the résumé was received.
    pub uploaded_at: DateTime<Utc>,
}

/// A résumé as received by a single rating request.
///
/// The document is never mutated after construction and is dropped together
/// with the request that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeDocument {
    text: String,
    source: SourceMetadata,
}

impl ResumeDocument {
    /// Wrap raw résumé text received now.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_source(text, SourceMetadata { filename: None, uploaded_at: Utc::now() })
    }

    /// Wrap raw résumé text with explicit source metadata.
    pub fn with_source(text: impl Into<String>, source: SourceMetadata) -> Self {
        Self { text: text.into(), source }
    }

    /// The raw, un-normalized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Source metadata.
    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }
}

/// A contiguous span of résumé text used as a retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier within the document (`chunk_{position}`).
    pub id: String,
    /// The chunk text, including any overlap carried from its predecessor.
    pub text: String,
    /// Zero-based position in document order.
    pub position: usize,
    /// The embedding vector; empty until the index is built.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create an un-embedded chunk at `position`.
    pub fn new(position: usize, text: impl Into<String>) -> Self {
        Self { id: format!("chunk_{position}"), text: text.into(), position, embedding: Vec::new() }
    }
}

/// One bullet point of an opportunity's requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    /// Unique identifier (`req_{n}`, starting at 1) in insertion order.
    pub id: String,
    /// The requirement text.
    pub text: String,
}

impl Requirement {
    /// Assign ids to requirement texts in order.
    ///
    /// Entries are trimmed and blank entries are skipped. Ids number the
    /// input position (`req_1` is the first input), so a skipped blank leaves
    /// a gap rather than shifting later ids.
    pub fn from_texts<I, S>(texts: I) -> Vec<Requirement>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        texts
            .into_iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let text = t.as_ref().trim();
                (!text.is_empty())
                    .then(|| Requirement { id: format!("req_{}", i + 1), text: text.to_string() })
            })
            .collect()
    }

    /// Split a pasted requirements block into one string per bullet.
    ///
    /// Bullet markers (`-`, `*`, `•`, `·`, `1.`, `2)`) are stripped and blank
    /// lines skipped.
    pub fn parse_bullets(block: &str) -> Vec<String> {
        block
            .lines()
            .map(strip_bullet)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(|c: char| matches!(c, '-' | '*' | '•' | '·' | '–')) {
        return rest.trim_start();
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(|c: char| c == '.' || c == ')') {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    line
}

/// The payload accepted at the request boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingRequest {
    /// Free-form résumé text.
    pub resume_text: String,
    /// Requirement bullet points, in display order.
    pub requirements: Vec<String>,
}

/// A retrieved [`Chunk`] paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]` (higher is more relevant).
    pub score: f32,
}

/// The résumé chunks retrieved for one requirement.
///
/// Results are ordered by descending score; equal scores keep the earlier
/// chunk first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// The requirement this evidence was retrieved for.
    pub requirement_id: String,
    /// Ranked results, at most `top_k` long.
    pub results: Vec<SearchResult>,
}

impl Evidence {
    /// Ids of the evidence chunks, in rank order.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.results.iter().map(|r| r.chunk.id.clone()).collect()
    }

    /// Whether `chunk_id` is part of this evidence.
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.results.iter().any(|r| r.chunk.id == chunk_id)
    }

    /// Number of evidence chunks.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no chunk was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
