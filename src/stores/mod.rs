//! Storage seams for chunk vectors and index records.
//!
//! [`VectorStore`] abstracts the namespaced vector database; every operation
//! is scoped to a namespace (one per document fingerprint) so two documents
//! can never surface each other's chunks. [`IndexRecordStore`] persists the
//! per-fingerprint indexed flag that short-circuits re-indexing; its `put`
//! is the commit point of an indexing run.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Chunk, RagError};

pub use sqlite::SqliteChunkStore;

/// Schema/strategy version stamped into every index record. Bumping it
/// invalidates records written under an older chunking or embedding scheme.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// A chunk with its embedding, as stored and retrieved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub namespace: String,
    pub chunk_index: usize,
    pub content: String,
    pub prev_content: Option<String>,
    pub next_content: Option<String>,
    pub metadata: serde_json::Value,
    /// Present on upsert; not round-tripped by search results.
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Builds a record from a pipeline chunk, embedding attached later.
    pub fn from_chunk(chunk: &Chunk, namespace: &str, chunk_index: usize) -> Result<Self, RagError> {
        let metadata = serde_json::to_value(&chunk.metadata)
            .map_err(|err| RagError::Chunking(err.to_string()))?;
        Ok(Self {
            id: chunk.id.to_string(),
            namespace: namespace.to_string(),
            chunk_index,
            content: chunk.content.clone(),
            prev_content: chunk.metadata.prev_content.clone(),
            next_content: chunk.metadata.next_content.clone(),
            metadata,
            embedding: None,
        })
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Persisted indexing state for one document fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub fingerprint: String,
    pub indexed: bool,
    pub chunk_count: usize,
    pub version: u32,
}

impl IndexRecord {
    /// Returns `true` when this record can short-circuit re-indexing.
    pub fn is_current(&self) -> bool {
        self.indexed && self.version == INDEX_SCHEMA_VERSION
    }
}

/// Namespaced vector storage.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces chunk records under `namespace`. Records without
    /// embeddings are rejected as a storage error.
    async fn upsert_chunks(&self, namespace: &str, chunks: Vec<ChunkRecord>)
    -> Result<(), RagError>;

    /// Returns up to `top_k` records in `namespace` ordered by ascending
    /// cosine distance to `embedding`.
    async fn search(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError>;

    /// Number of chunks stored under `namespace`.
    async fn count(&self, namespace: &str) -> Result<usize, RagError>;
}

/// Persisted `{fingerprint -> IndexRecord}` lookup.
#[async_trait]
pub trait IndexRecordStore: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<IndexRecord>, RagError>;

    /// Writes the record. Called once per successful indexing run, after all
    /// chunk batches are upserted.
    async fn put(&self, record: IndexRecord) -> Result<(), RagError>;
}
