//! Retrieval-augmented question answering over remote documents.
//!
//! ```text
//! QaRequest ──► ingestion::fetch ──► ingestion::extract ──► Vec<Segment>
//!                                                              │
//! Vec<Segment> ──► ingestion::chunk ──► safety filter ──► indexer::Indexer
//!                                                              │
//!                                       stores::sqlite::SqliteChunkStore
//!                                                              │
//! Question ──► retrieval::Retriever ──► domain classify ──► composer::AnswerComposer
//!                                                              │
//!                                                     QaResponse.answers
//! ```
//!
//! Indexing is idempotent per document fingerprint: repeat requests for the
//! same URL reuse the stored vectors and pay only for retrieval and
//! completion.

pub mod composer;
pub mod domain;
pub mod indexer;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod safety;
pub mod stores;
pub mod types;

pub use composer::{AnswerComposer, REFUSAL};
pub use indexer::{Fingerprint, IndexHandle, Indexer, IndexerConfig};
pub use ingestion::{ChunkerConfig, DocumentFetcher, DocumentFormat, chunk_segments};
pub use pipeline::{QaPipeline, QaRequest, QaResponse};
pub use retrieval::{NO_MATCH_SENTINEL, Retriever, RetrieverConfig};
pub use safety::SafetyFilter;
pub use stores::{SqliteChunkStore, VectorStore};
pub use types::{Chunk, RagError, Segment, SegmentMetadata};
