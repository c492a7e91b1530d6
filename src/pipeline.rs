//! End-to-end question answering over a remote document.
//!
//! ```text
//! QaRequest ──> fetch+extract ──> ensure_indexed ──> per-question:
//!                                                     retrieve -> compose
//!               (skipped when the fingerprint is already indexed)
//! ```
//!
//! Questions run in concurrent batches; answers come back in question order
//! regardless of completion order. Per-question failures degrade to error
//! strings so a single bad question cannot sink the batch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::composer::{AnswerComposer, REFUSAL};
use crate::indexer::{Indexer, IndexerConfig};
use crate::ingestion::{DocumentFetcher, resolve_source_url};
use crate::providers::{CompletionProvider, EmbeddingProvider, Moderator, OcrEngine};
use crate::retrieval::{Retriever, RetrieverConfig};
use crate::stores::{IndexRecordStore, VectorStore};
use crate::types::RagError;

/// Questions answered concurrently per batch.
const QUESTION_BATCH: usize = 3;

/// Answer used when the document yields no extractable text at all.
const UNREADABLE_DOCUMENT: &str =
    "The document could not be read, so this question cannot be answered.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRequest {
    /// Document location; `src` query-parameter redirection is honored.
    #[serde(rename = "documents")]
    pub document_url: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    /// One answer per request question, in the same order.
    pub answers: Vec<String>,
}

/// Builder for [`QaPipeline`]. Providers are required; stores, fetcher, and
/// tuning knobs have defaults.
pub struct QaPipelineBuilder {
    vectors: Arc<dyn VectorStore>,
    records: Arc<dyn IndexRecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    moderator: Arc<dyn Moderator>,
    ocr: Arc<dyn OcrEngine>,
    indexer_config: IndexerConfig,
    retriever_config: RetrieverConfig,
    timeout: Option<Duration>,
}

impl QaPipelineBuilder {
    #[must_use]
    pub fn indexer_config(mut self, config: IndexerConfig) -> Self {
        self.indexer_config = config;
        self
    }

    #[must_use]
    pub fn retriever_config(mut self, config: RetrieverConfig) -> Self {
        self.retriever_config = config;
        self
    }

    /// Wall-clock budget for a whole request. None means unbounded.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> QaPipeline {
        let fetcher = DocumentFetcher::new(Client::new(), self.ocr);
        let indexer = Indexer::new(
            self.vectors.clone(),
            self.records,
            self.embedder.clone(),
            self.indexer_config,
        );
        let retriever = Retriever::new(self.vectors, self.embedder, self.retriever_config);
        let composer = AnswerComposer::new(self.completion, self.moderator);
        QaPipeline {
            fetcher,
            indexer,
            retriever,
            composer,
            timeout: self.timeout,
        }
    }
}

pub struct QaPipeline {
    fetcher: DocumentFetcher,
    indexer: Indexer,
    retriever: Retriever,
    composer: AnswerComposer,
    timeout: Option<Duration>,
}

impl QaPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn builder(
        vectors: Arc<dyn VectorStore>,
        records: Arc<dyn IndexRecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        moderator: Arc<dyn Moderator>,
        ocr: Arc<dyn OcrEngine>,
    ) -> QaPipelineBuilder {
        QaPipelineBuilder {
            vectors,
            records,
            embedder,
            completion,
            moderator,
            ocr,
            indexer_config: IndexerConfig::default(),
            retriever_config: RetrieverConfig {
                top_k: 8,
                ..RetrieverConfig::default()
            },
            timeout: None,
        }
    }

    /// Answers every question in the request against its document.
    pub async fn run(&self, request: QaRequest) -> Result<QaResponse, RagError> {
        match self.timeout {
            Some(budget) => tokio::time::timeout(budget, self.run_inner(request))
                .await
                .map_err(|_| RagError::Timeout(budget))?,
            None => self.run_inner(request).await,
        }
    }

    async fn run_inner(&self, request: QaRequest) -> Result<QaResponse, RagError> {
        let url = resolve_source_url(&request.document_url)?;
        tracing::info!(url = %url, questions = request.questions.len(), "processing request");

        let segments = self.fetcher.fetch(&url).await?;
        if segments.iter().all(|segment| segment.content.trim().is_empty()) {
            tracing::warn!(url = %url, "document produced no readable text");
            return Ok(QaResponse {
                answers: vec![UNREADABLE_DOCUMENT.to_string(); request.questions.len()],
            });
        }

        let handle = self.indexer.ensure_indexed(&url, &segments).await?;
        let namespace = handle.namespace().to_string();

        let mut answers = Vec::with_capacity(request.questions.len());
        for batch in request.questions.chunks(QUESTION_BATCH) {
            let futures = batch
                .iter()
                .map(|question| self.answer_one(&namespace, question));
            answers.extend(join_all(futures).await);
        }
        Ok(QaResponse { answers })
    }

    /// Retrieval errors degrade to an error string; composition handles its
    /// own failures internally.
    async fn answer_one(&self, namespace: &str, question: &str) -> String {
        // Refused questions are never embedded or searched.
        if self.composer.should_refuse(question).await {
            return REFUSAL.to_string();
        }
        let context = match self.retriever.context_for(namespace, question).await {
            Ok(context) => context,
            Err(err) => {
                tracing::error!(error = %err, "retrieval failed");
                return format!("Unable to generate an answer for this question: {err}");
            }
        };
        self.composer.answer(&context, question).await
    }
}
