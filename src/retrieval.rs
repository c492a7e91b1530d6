//! Similarity retrieval with neighbor widening.
//!
//! Chunks are sized for embedding quality, not for answering, so accepted
//! hits are widened with the chunk's stored neighbors before they reach the
//! prompt. Retrieval over-fetches, drops weak matches at or past the
//! distance cutoff, deduplicates, and only then trims to `top_k`. The
//! last-resort fallback pass keeps raw contents unwidened.

use std::collections::HashSet;
use std::sync::Arc;

use crate::providers::EmbeddingProvider;
use crate::stores::VectorStore;
use crate::types::RagError;

/// Returned in place of context when nothing relevant survives filtering.
pub const NO_MATCH_SENTINEL: &str = "No relevant information found in the document.";

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Passages kept per question.
    pub top_k: usize,
    /// Maximum cosine distance for a hit to count as relevant.
    pub distance_cutoff: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            distance_cutoff: 0.8,
        }
    }
}

/// One widened passage handed to prompt composition.
#[derive(Debug, Clone)]
pub struct Passage {
    pub content: String,
    pub distance: f32,
}

pub struct Retriever {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            config,
        }
    }

    /// Retrieves the passages most similar to `question` within `namespace`.
    ///
    /// Never returns an empty vec for a non-empty namespace: if the cutoff
    /// eliminates every hit the raw nearest neighbors are used instead, so
    /// the composer always has something to ground a refusal or answer on.
    pub async fn retrieve(
        &self,
        namespace: &str,
        question: &str,
    ) -> Result<Vec<Passage>, RagError> {
        let query = self.embedder.embed(question).await?;
        // Over-fetch so dedup and the cutoff still leave top_k candidates.
        let fetch_k = self.config.top_k * 2;
        let hits = self.vectors.search(namespace, &query, fetch_k).await?;
        if hits.is_empty() {
            tracing::debug!(namespace, "no indexed chunks matched the query");
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut passages = Vec::new();
        for (record, distance) in &hits {
            // Strictly below the cutoff; a hit at exactly the cutoff is out.
            if *distance >= self.config.distance_cutoff {
                continue;
            }
            if !seen.insert(record.content.clone()) {
                continue;
            }
            passages.push(Passage {
                content: widen(
                    record.prev_content.as_deref(),
                    &record.content,
                    record.next_content.as_deref(),
                ),
                distance: *distance,
            });
        }

        if passages.is_empty() {
            tracing::debug!(
                namespace,
                cutoff = self.config.distance_cutoff,
                nearest = hits[0].1,
                "all hits past the distance cutoff, falling back to nearest"
            );
            // Fallback keeps raw contents, without neighbor widening.
            for (record, distance) in hits.iter().take(self.config.top_k) {
                if !seen.insert(record.content.clone()) {
                    continue;
                }
                passages.push(Passage {
                    content: record.content.clone(),
                    distance: *distance,
                });
            }
        }

        passages.truncate(self.config.top_k);
        Ok(passages)
    }

    /// Joins retrieved passages into the context block for the prompt, or
    /// the sentinel when retrieval produced nothing.
    pub async fn context_for(
        &self,
        namespace: &str,
        question: &str,
    ) -> Result<String, RagError> {
        let passages = self.retrieve(namespace, question).await?;
        if passages.is_empty() {
            return Ok(NO_MATCH_SENTINEL.to_string());
        }
        Ok(passages
            .iter()
            .map(|passage| passage.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn widen(prev: Option<&str>, content: &str, next: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(prev) = prev {
        parts.push(prev);
    }
    parts.push(content);
    if let Some(next) = next {
        parts.push(next);
    }
    parts.join("\n")
}
