//! Embedding support for the embedding-similarity history strategy.
//!
//! The [`Embedder`] trait produces one vector per input text; relevance
//! selection ranks prior turn summaries against the current query by cosine
//! similarity. [`OpenAiEmbedder`] is the production implementation.

use async_trait::async_trait;

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};

use crate::error::AgentError;

/// Produces float vectors from text, one per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each text; the output length equals the input length.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError>;
}

/// Cosine similarity of two vectors; 0.0 when either has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// OpenAI Embeddings client (e.g. `text-embedding-3-small`).
pub struct OpenAiEmbedder {
    config: OpenAIConfig,
    model: String,
}

impl OpenAiEmbedder {
    /// Builds an embedder with the default config (`OPENAI_API_KEY` env).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            config: OpenAIConfig::new(),
            model: model.into(),
        }
    }

    /// Builds an embedder with explicit config.
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            config,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let inputs: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let input = if inputs.len() == 1 {
            EmbeddingInput::String(inputs.into_iter().next().unwrap_or_default())
        } else {
            EmbeddingInput::StringArray(inputs)
        };
        let request = CreateEmbeddingRequest {
            input,
            model: self.model.clone(),
            ..Default::default()
        };
        let client = Client::with_config(self.config.clone());
        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AgentError::Llm(format!("embeddings API error: {}", e)))?;
        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Identical vectors score 1, orthogonal score 0.
    #[test]
    fn cosine_basic_cases() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    /// **Scenario**: Zero vectors and mismatched lengths score 0 rather than NaN.
    #[test]
    fn cosine_degenerate_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
