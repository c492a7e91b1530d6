//! Capability traits consumed by the pipeline.
//!
//! The expensive and environment-specific operations (embedding generation,
//! text completion, OCR, content moderation) are narrow async traits so the
//! core stays testable with deterministic mocks and swappable across vendors.

pub mod mock;

#[cfg(feature = "rig")]
pub mod gemini;

use async_trait::async_trait;

use crate::types::RagError;

pub use mock::{MockCompletionProvider, MockEmbeddingProvider, MockModerator, MockOcrEngine};

/// Turns text into a dense vector. `text -> vector`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Sampling knobs forwarded to the completion capability.
///
/// Defaults mirror deterministic answer generation: temperature zero with a
/// bounded output length.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.95,
            max_output_tokens: 300,
        }
    }
}

/// Produces a text completion for a prompt. `prompt -> text`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, RagError>;
}

/// Optical character recognition. `image bytes -> text`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, RagError>;
}

/// External content-moderation classification. `text -> flagged?`.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn flag(&self, text: &str) -> Result<bool, RagError>;
}
