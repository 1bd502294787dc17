pub mod error;

pub use error::{EmbeddingError, EmbeddingResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal_core::{Embedder, PipelineError};
use std::time::Duration;
use tracing::debug;

/// Configuration for the embedding service
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("EMBEDDING_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8005".to_string()),
            model: std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "BAAI/bge-m3".to_string()),
            batch_size: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    normalize: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// One vector per input, all of the same non-zero dimension
fn validate_embeddings(expected: usize, embeddings: Vec<Vec<f32>>) -> EmbeddingResult<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }
    if let Some(first) = embeddings.first() {
        let dim = first.len();
        if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
            return Err(EmbeddingError::InvalidResponse(
                "embeddings have inconsistent dimensions".to_string(),
            ));
        }
    }
    Ok(embeddings)
}

/// HTTP client for the text embedding service
#[derive(Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Embed texts in batches of `batch_size`, preserving input order
    pub async fn embed_texts(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let request = EmbedRequest {
                texts: batch,
                model: &self.config.model,
                normalize: true,
            };

            let response = self
                .client
                .post(format!("{}/embed", self.config.url.trim_end_matches('/')))
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(EmbeddingError::ServiceUnavailable(format!(
                    "Status: {}",
                    response.status()
                )));
            }

            let body = response.json::<EmbedResponse>().await?;
            out.extend(validate_embeddings(batch.len(), body.embeddings)?);
            debug!("Embedded batch of {} texts", batch.len());
        }

        Ok(out)
    }

    /// Check service health
    pub async fn health(&self) -> EmbeddingResult<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.config.url.trim_end_matches('/')))
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.embed_texts(texts).await?)
    }
}
