//! Gemini-backed providers via rig.
//!
//! Enabled with the `rig` feature. Credentials come from `GEMINI_API_KEY`;
//! `from_env` loads a `.env` file first so local runs need no exported
//! shell state.

use async_trait::async_trait;
use rig::client::{CompletionClient, EmbeddingsClient};
use rig::completion::{AssistantContent, CompletionModel};
use rig::embeddings::EmbeddingModel;
use rig::providers::gemini;

use crate::providers::{CompletionProvider, EmbeddingProvider, SamplingParams};
use crate::types::RagError;

pub const COMPLETION_MODEL: &str = "gemini-1.5-flash";
pub const EMBEDDING_MODEL: &str = "text-embedding-004";

/// Embeddings from Gemini's text embedding endpoint.
#[derive(Clone)]
pub struct GeminiEmbeddingProvider {
    model: gemini::embedding::EmbeddingModel,
}

impl GeminiEmbeddingProvider {
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| RagError::Embedding("GEMINI_API_KEY is not set".into()))?;
        let client = gemini::Client::new(&api_key)
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        Ok(Self {
            model: client.embedding_model(EMBEDDING_MODEL),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let embedding = self
            .model
            .embed_text(text)
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        Ok(embeddings
            .into_iter()
            .map(|e| e.vec.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}

/// Answer generation through Gemini's completion endpoint.
#[derive(Clone)]
pub struct GeminiCompletionProvider {
    model: gemini::completion::CompletionModel,
}

impl GeminiCompletionProvider {
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| RagError::Completion("GEMINI_API_KEY is not set".into()))?;
        let client = gemini::Client::new(&api_key)
            .map_err(|err| RagError::Completion(err.to_string()))?;
        Ok(Self {
            model: client.completion_model(COMPLETION_MODEL),
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiCompletionProvider {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, RagError> {
        let request = self
            .model
            .completion_request(rig::completion::Message::user(prompt.to_string()))
            .temperature(f64::from(params.temperature))
            .max_tokens(u64::from(params.max_output_tokens))
            .build();
        let response = self
            .model
            .completion(request)
            .await
            .map_err(|err| RagError::Completion(err.to_string()))?;
        let text = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return Err(RagError::Completion("empty completion response".into()));
        }
        Ok(text)
    }
}
