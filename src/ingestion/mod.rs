//! Turning a remote document into index-ready chunks.
//!
//! * [`fetch`]: URL resolution and allow-listed download with a size ceiling.
//! * [`extract`]: per-format text extraction into [`crate::types::Segment`]s.
//! * [`chunk`]: cascading-separator splitting with neighbor context.

pub mod chunk;
pub mod extract;
pub mod fetch;

pub use chunk::{ChunkerConfig, chunk_segments, split_with_overlap};
pub use extract::NO_READABLE_TEXT;
pub use fetch::{DocumentFetcher, DocumentFormat, MAX_DOCUMENT_BYTES, resolve_source_url};
