//! Shared data model and the crate-wide error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the question-answering pipeline.
///
/// Hard failures only. Expected-but-unhelpful outcomes (unsupported file
/// formats, no retrieval matches) are represented as empty results or
/// sentinel strings at the call sites that produce them, so callers can
/// distinguish "retry-worthy" from "this is the answer: nothing".
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RagError {
    /// Network or transport failure while downloading a document.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A recognized document format could not be parsed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Chunk construction or serialization failure.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Vector store or index-record store failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Embedding capability failure.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Completion capability failure.
    #[error("completion failed: {0}")]
    Completion(String),

    /// Moderation capability failure.
    #[error("moderation failed: {0}")]
    Moderation(String),

    /// OCR capability failure.
    #[error("ocr failed: {0}")]
    Ocr(String),

    /// Every chunk of the document was rejected by the safety filter.
    #[error("document rejected: all content failed the safety screen")]
    UnsafeDocument,

    /// The request exceeded its latency budget.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Filesystem error (temp spool, cache files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Fetch(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for RagError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}

/// A unit of extracted text with its source location.
///
/// Produced by the fetcher, consumed by the chunker. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub content: String,
    pub metadata: SegmentMetadata,
}

impl Segment {
    pub fn new(content: impl Into<String>, metadata: SegmentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// Source metadata attached to every [`Segment`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Canonical URL the segment was extracted from.
    pub source: String,
    /// One-based page or slide number, when the format has pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Archive-internal path of the image an OCR segment came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl SegmentMetadata {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            image_ref: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }
}

/// Bounded-length text unit carrying literal neighbor context.
///
/// Neighbor fields hold the raw text of the adjacent chunks (not ids), so
/// retrieval can widen context without a second store round-trip. Created
/// once per indexing run; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Metadata attached to every [`Chunk`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Literal text of the preceding chunk, absent for the first chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<String>,
    /// Literal text of the following chunk, absent for the last chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_content: Option<String>,
}
