//! Résumé chunking.
//!
//! This module provides the [`Chunker`] trait and [`ResumeChunker`], which
//! splits a résumé into overlapping retrieval units:
//!
//! - paragraphs and section headings first ("EXPERIENCE", "Skills:", `## Education`)
//! - sentences when a unit exceeds the size budget
//! - words, then characters, as a last resort
//!
//! All sizes are counted in `char`s, never bytes.

use crate::document::{Chunk, ResumeDocument};
use crate::error::{RatingError, Result};

/// Headings longer than this are treated as ordinary text.
const MAX_HEADING_CHARS: usize = 48;

/// A strategy for splitting a résumé into chunks.
///
/// Implementations produce [`Chunk`]s with text and position but no
/// embeddings. Embeddings are attached when the index is built.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::EmptyDocument`] if the document has no
    /// extractable text.
    fn chunk(&self, document: &ResumeDocument) -> Result<Vec<Chunk>>;
}

/// Splits résumé text on section and paragraph boundaries with overlap.
///
/// Each chunk after the first starts with the tail of its predecessor, so a
/// statement straddling a boundary is visible in both chunks. No chunk
/// exceeds `chunk_size` characters.
///
/// # Example
///
/// ```rust,ignore
/// use ats_rag::{Chunker, ResumeChunker, ResumeDocument};
///
/// let chunker = ResumeChunker::new(600, 72);
/// let chunks = chunker.chunk(&ResumeDocument::new(text))?;
/// ```
#[derive(Debug, Clone)]
pub struct ResumeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ResumeChunker {
    /// Create a new `ResumeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of characters carried into the next chunk;
    ///   clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Chunk raw text directly.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::EmptyDocument`] if the text has no letters or
    /// digits after normalization.
    pub fn chunk_text(&self, text: &str) -> Result<Vec<Chunk>> {
        let normalized = normalize_text(text);
        if !normalized.chars().any(char::is_alphanumeric) {
            return Err(RatingError::EmptyDocument);
        }

        // Room left for new content once the carried tail and its separator are in.
        let budget = self.chunk_size - self.chunk_overlap;
        let tail_len = self.chunk_overlap.saturating_sub(1);

        let units: Vec<String> =
            split_units(&normalized).iter().flat_map(|unit| fit(unit, budget)).collect();
        let pieces = pack(units, budget, "\n\n");

        let mut chunks: Vec<Chunk> = Vec::with_capacity(pieces.len());
        for (position, piece) in pieces.into_iter().enumerate() {
            let text = match chunks.last() {
                Some(prev) if tail_len > 0 => {
                    let tail = overlap_tail(&prev.text, tail_len);
                    if tail.is_empty() { piece } else { format!("{tail} {piece}") }
                }
                _ => piece,
            };
            chunks.push(Chunk::new(position, text));
        }
        Ok(chunks)
    }
}

impl Chunker for ResumeChunker {
    fn chunk(&self, document: &ResumeDocument) -> Result<Vec<Chunk>> {
        self.chunk_text(document.text())
    }
}

/// Normalize extracted résumé text.
///
/// Strips byte-order marks, zero-width and control characters, maps every
/// Unicode space to `' '`, unifies line endings, collapses runs of spaces,
/// trims each line, and reduces any run of blank lines to one paragraph break.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .replace("\r\n", "\n")
        .chars()
        .filter_map(|c| match c {
            '\n' | '\r' => Some('\n'),
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}' => None,
            c if c.is_whitespace() => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    let mut paragraph_break = false;
    for line in cleaned.split('\n') {
        let line = collapse_whitespace(line);
        if line.is_empty() {
            paragraph_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        paragraph_break = false;
    }
    out
}

/// Collapse every whitespace run (including line breaks) into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_heading(line: &str) -> bool {
    let len = char_len(line);
    if line.starts_with('#') {
        return true;
    }
    if len > MAX_HEADING_CHARS {
        return false;
    }
    if line.ends_with(':') {
        return true;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
}

/// Split normalized text into paragraphs, starting a new unit at every heading.
fn split_units(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    for paragraph in text.split("\n\n") {
        let mut current = String::new();
        for line in paragraph.lines() {
            if is_heading(line) && !current.is_empty() {
                units.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
        if !current.is_empty() {
            units.push(current);
        }
    }
    units
}

/// Break a unit into pieces of at most `budget` characters:
/// sentences, then words, then raw characters.
fn fit(text: &str, budget: usize) -> Vec<String> {
    if char_len(text) <= budget {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    if sentences.len() > 1 {
        return pack(sentences.into_iter().flat_map(|s| fit(s, budget)), budget, " ");
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > 1 {
        return pack(words.into_iter().flat_map(|w| fit(w, budget)), budget, " ");
    }

    let chars: Vec<char> = text.chars().collect();
    chars.chunks(budget).map(|c| c.iter().collect()).collect()
}

/// Split at `.`, `!`, `?` or `;` followed by whitespace, and at line breaks.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i),
            '.' | '!' | '?' | ';' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Greedily merge pieces (each already within `budget`) joined by `separator`.
fn pack<I, S>(pieces: I, budget: usize, separator: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let sep_len = char_len(separator);
    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece: String = piece.into();
        let piece_len = char_len(&piece);
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + sep_len + piece_len <= budget {
            current.push_str(separator);
            current.push_str(&piece);
            current_len += sep_len + piece_len;
        } else {
            packed.push(std::mem::replace(&mut current, piece));
            current_len = piece_len;
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }
    packed
}

/// The last `max_chars` characters of `text`, advanced to a word start when
/// the cut falls inside a word.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    let total = char_len(text);
    if max_chars == 0 {
        return "";
    }
    if total <= max_chars {
        return text.trim();
    }

    let cut = text.char_indices().nth(total - max_chars).map_or(text.len(), |(i, _)| i);
    let tail = &text[cut..];
    let mid_word = text[..cut].chars().next_back().is_some_and(|c| !c.is_whitespace());
    let tail = match tail.find(char::is_whitespace) {
        Some(ws) if mid_word => &tail[ws..],
        _ => tail,
    };
    tail.trim()
}
