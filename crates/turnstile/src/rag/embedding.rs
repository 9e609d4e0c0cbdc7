use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use turnstile_openai_model::OpenAIConfig;

use super::{DEFAULT_EMBEDDING_MODEL, RagError};

/// Turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns one vector per text, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// An [`Embedder`] calling an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone, Debug)]
pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAIEmbedder {
    /// Creates an embedder sharing the endpoint and key of a chat model
    /// configuration. The model comes from `OPENAI_EMBEDDING_MODEL`.
    pub fn new(config: &OpenAIConfig) -> Self {
        let model = env::var("OPENAI_EMBEDDING_MODEL")
            .ok()
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_owned());
        Self {
            client: Client::new(),
            base_url: config.base_url().to_owned(),
            api_key: config.api_key().to_owned(),
            model,
        }
    }

    /// Overrides the embedding model.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Returns the embedding model.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!("embedding {} texts with {}", texts.len(), self.model);

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut data = resp.json::<EmbeddingResponse>().await?.data;
        if data.len() != texts.len() {
            return Err(RagError::EmbeddingCount {
                expected: texts.len(),
                actual: data.len(),
            });
        }
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Returns the cosine similarity of two vectors, in `[-1, 1]`.
///
/// Vectors of different lengths, empty vectors and zero vectors have a
/// similarity of 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}
