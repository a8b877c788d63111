//! PDF résumé intake.
//!
//! This module is only available when the `pdf` feature is enabled. Text is
//! pulled out of every page with `pdf-extract`; layout, images and fonts are
//! discarded. The result goes through the same normalization as plain text
//! when the résumé is chunked.

use chrono::Utc;
use tracing::{debug, error};

use crate::document::{ResumeDocument, SourceMetadata};
use crate::error::{RatingError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `bytes` start with the PDF header.
///
/// Leading whitespace before the header is tolerated, as some generators
/// emit it.
pub fn is_pdf(bytes: &[u8]) -> bool {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}

impl ResumeDocument {
    /// Extract a résumé from PDF bytes, recording `filename` as its source.
    ///
    /// A PDF that yields no text (a scanned image, for instance) still
    /// produces a document; chunking then rejects it with
    /// [`RatingError::EmptyDocument`].
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::Extraction`] if the bytes are not a PDF or the
    /// PDF cannot be parsed.
    pub fn from_pdf(bytes: &[u8], filename: Option<String>) -> Result<Self> {
        let label = filename.clone().unwrap_or_else(|| "<memory>".to_string());
        let extraction_error = |message: String| {
            error!(filename = %label, %message, "PDF extraction failed");
            RatingError::Extraction { filename: label.clone(), message }
        };

        if !is_pdf(bytes) {
            return Err(extraction_error("missing %PDF- header".to_string()));
        }

        // Malformed fonts can make the extractor panic rather than fail.
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| extraction_error("extractor panicked on malformed PDF".to_string()))?
            .map_err(|e| extraction_error(e.to_string()))?;
        debug!(filename = %label, bytes = bytes.len(), text_len = text.len(), "extracted PDF text");

        Ok(Self::with_source(text, SourceMetadata { filename, uploaded_at: Utc::now() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_header() {
        assert!(is_pdf(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3"));
        assert!(is_pdf(b"\r\n%PDF-1.4"));
        assert!(!is_pdf(b"JANE DOE\nBackend Engineer"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn non_pdf_bytes_are_an_extraction_error() {
        let err = ResumeDocument::from_pdf(b"plain text resume", Some("cv.pdf".into())).unwrap_err();
        match err {
            RatingError::Extraction { filename, message } => {
                assert_eq!(filename, "cv.pdf");
                assert!(message.contains("header"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
