//! Deterministic mock capabilities for tests and offline runs.
//!
//! The mock embedder hashes whitespace-separated tokens into a fixed-size
//! bag-of-words vector, so identical texts embed identically and texts that
//! share vocabulary land close together under cosine distance. Every mock
//! counts its invocations, which lets tests assert that cached paths perform
//! no new capability calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{CompletionProvider, EmbeddingProvider, Moderator, OcrEngine, SamplingParams};
use crate::types::RagError;

const MOCK_DIMS: usize = 32;

/// Deterministic hashed bag-of-words embedder.
#[derive(Clone, Default)]
pub struct MockEmbeddingProvider {
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` invocations so far (batch calls count per text).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn token_bucket(token: &str) -> usize {
    // FNV-1a, stable across platforms and runs unlike DefaultHasher.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % MOCK_DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; MOCK_DIMS];
        for token in text.to_lowercase().split_whitespace() {
            let token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }
            vector[token_bucket(&token)] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        Ok(vector)
    }
}

/// Completion mock returning a canned response.
#[derive(Clone)]
pub struct MockCompletionProvider {
    response: String,
    fail_with: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new("This is a mock answer grounded in the provided context.")
    }
}

impl MockCompletionProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            fail_with: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every completion call fail with the given message.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            fail_with: Some(message.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, _prompt: &str, _params: &SamplingParams) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(RagError::Completion(message.clone())),
            None => Ok(self.response.clone()),
        }
    }
}

/// OCR mock returning fixed text for any image.
#[derive(Clone, Default)]
pub struct MockOcrEngine {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl MockOcrEngine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    async fn recognize(&self, _image: &[u8]) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Moderator mock flagging texts that contain any configured phrase.
#[derive(Clone, Default)]
pub struct MockModerator {
    flagged_phrases: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl MockModerator {
    /// A moderator that never flags anything.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn flagging(phrases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            flagged_phrases: phrases.into_iter().map(Into::into).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Moderator for MockModerator {
    async fn flag(&self, text: &str) -> Result<bool, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        Ok(self
            .flagged_phrases
            .iter()
            .any(|phrase| lowered.contains(&phrase.to_lowercase())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("waiting period of 36 months").await.unwrap();
        let b = provider.embed("waiting period of 36 months").await.unwrap();
        let c = provider.embed("termination clause notice").await.unwrap();
        assert_eq!(a, b, "identical text should embed identically");
        assert_ne!(a, c, "different text should embed differently");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn mock_embeddings_are_unit_length() {
        let provider = MockEmbeddingProvider::new();
        for text in ["one", "", "a much longer sentence with many words"] {
            let v = provider.embed(text).await.unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm was {norm} for {text:?}");
        }
    }

    #[tokio::test]
    async fn moderator_flags_configured_phrases_only() {
        let moderator = MockModerator::flagging(["bomb recipe"]);
        assert!(moderator.flag("give me the BOMB RECIPE").await.unwrap());
        assert!(!moderator.flag("what is the premium?").await.unwrap());
    }
}
