//! Idempotent document indexing with fingerprint-keyed caching.
//!
//! Embedding plus vector upsert is the most expensive step in the pipeline,
//! so indexing is gated twice: an in-process `{fingerprint -> handle}` map
//! for the lifetime of the service, and a persisted [`IndexRecord`] that
//! survives restarts. The record write is the commit point: a crash after
//! some batches were upserted but before the record lands simply re-indexes
//! on the next attempt instead of trusting a half-written namespace.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::ingestion::chunk::{ChunkerConfig, chunk_segments};
use crate::providers::EmbeddingProvider;
use crate::safety::SafetyFilter;
use crate::stores::{
    ChunkRecord, INDEX_SCHEMA_VERSION, IndexRecord, IndexRecordStore, VectorStore,
};
use crate::types::{RagError, Segment};

/// Stable hash of a document's canonical URL.
///
/// Same URL, same fingerprint, across runs and processes. Used both as the
/// vector-store namespace and as the index-record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn for_url(url: &Url) -> Self {
        let digest = Sha256::digest(url.as_str().as_bytes());
        let mut hex = String::with_capacity(32);
        for byte in &digest[..16] {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to an indexed document's namespace.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    pub fingerprint: Fingerprint,
    pub chunk_count: usize,
}

impl IndexHandle {
    /// Namespace all of this document's chunks live under.
    pub fn namespace(&self) -> &str {
        self.fingerprint.as_str()
    }
}

/// Batching knobs for index writes.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Chunks per upsert batch.
    pub batch_size: usize,
    /// Concurrent in-flight batches; batches are independent and
    /// order-insensitive for storage.
    pub max_concurrent_batches: usize,
    pub chunker: ChunkerConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent_batches: 2,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Chunks, filters, embeds, and upserts documents exactly once per
/// fingerprint.
pub struct Indexer {
    vectors: Arc<dyn VectorStore>,
    records: Arc<dyn IndexRecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    safety: SafetyFilter,
    config: IndexerConfig,
    handles: Mutex<HashMap<String, IndexHandle>>,
}

impl Indexer {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        records: Arc<dyn IndexRecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            vectors,
            records,
            embedder,
            safety: SafetyFilter::new(),
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Indexes `segments` under the fingerprint of `url`, unless a current
    /// record already marks the document indexed. Re-entrant calls for the
    /// same fingerprint are no-ops returning the existing handle.
    pub async fn ensure_indexed(
        &self,
        url: &Url,
        segments: &[Segment],
    ) -> Result<IndexHandle, RagError> {
        let fingerprint = Fingerprint::for_url(url);

        if let Some(handle) = self.handles.lock().get(fingerprint.as_str()) {
            tracing::debug!(fingerprint = %fingerprint, "index handle cache hit");
            return Ok(handle.clone());
        }

        if let Some(record) = self.records.get(fingerprint.as_str()).await? {
            if record.is_current() {
                tracing::info!(
                    fingerprint = %fingerprint,
                    chunk_count = record.chunk_count,
                    "document already indexed, skipping"
                );
                let handle = IndexHandle {
                    fingerprint: fingerprint.clone(),
                    chunk_count: record.chunk_count,
                };
                self.handles
                    .lock()
                    .insert(fingerprint.as_str().to_string(), handle.clone());
                return Ok(handle);
            }
            tracing::info!(
                fingerprint = %fingerprint,
                record_version = record.version,
                "stale index record, re-indexing"
            );
        }

        let chunks = chunk_segments(segments, &self.config.chunker);
        let total = chunks.len();
        let safe: Vec<_> = chunks
            .into_iter()
            .filter(|chunk| !self.safety.is_dangerous(&chunk.content))
            .collect();
        let dropped = total - safe.len();
        if dropped > 0 {
            tracing::warn!(fingerprint = %fingerprint, dropped, "safety filter dropped chunks");
        }
        if safe.is_empty() && total > 0 {
            return Err(RagError::UnsafeDocument);
        }

        let namespace = fingerprint.as_str();
        let mut records = Vec::with_capacity(safe.len());
        for (index, chunk) in safe.iter().enumerate() {
            records.push(ChunkRecord::from_chunk(chunk, namespace, index)?);
        }
        let chunk_count = records.len();

        let batches: Vec<Vec<ChunkRecord>> = records
            .chunks(self.config.batch_size)
            .map(<[ChunkRecord]>::to_vec)
            .collect();
        let mut upserts = stream::iter(
            batches
                .into_iter()
                .map(|batch| self.embed_and_upsert(namespace, batch)),
        )
        .buffer_unordered(self.config.max_concurrent_batches.max(1));
        while let Some(result) = upserts.next().await {
            result?;
        }
        drop(upserts);

        // Commit point: only now is the document considered indexed.
        self.records
            .put(IndexRecord {
                fingerprint: namespace.to_string(),
                indexed: true,
                chunk_count,
                version: INDEX_SCHEMA_VERSION,
            })
            .await?;
        tracing::info!(fingerprint = %fingerprint, chunk_count, "document indexed");

        let handle = IndexHandle {
            fingerprint: fingerprint.clone(),
            chunk_count,
        };
        self.handles
            .lock()
            .insert(namespace.to_string(), handle.clone());
        Ok(handle)
    }

    async fn embed_and_upsert(
        &self,
        namespace: &str,
        batch: Vec<ChunkRecord>,
    ) -> Result<(), RagError> {
        let texts: Vec<String> = batch.iter().map(|record| record.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let embedded: Vec<ChunkRecord> = batch
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| record.with_embedding(embedding))
            .collect();
        tracing::debug!(namespace, batch_len = embedded.len(), "upserting chunk batch");
        self.vectors.upsert_chunks(namespace, embedded).await
    }
}
