//! Gemini embedding client and vector utilities.
//!
//! [`GeminiEmbedder`] implements [`Embedder`] over the
//! `batchEmbedContents` endpoint. Inputs are sent in batches of at most
//! [`MAX_BATCH`] texts; retry and backoff are handled by
//! [`GeminiClient`](crate::gemini::GeminiClient).

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingSettings;
use crate::gemini::{model_id, GeminiClient};
use crate::traits::Embedder;

/// Upper bound on texts per `batchEmbedContents` request.
pub const MAX_BATCH: usize = 100;

const EMBED_RETRIES: u32 = 5;

pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, settings: &EmbeddingSettings) -> Self {
        Self {
            client,
            model: model_id(&settings.model_name).to_string(),
        }
    }

    /// Client keyed from `GEMINI_API_KEY`.
    pub fn from_env(settings: &EmbeddingSettings) -> Result<Self> {
        Ok(Self::new(GeminiClient::from_env(EMBED_RETRIES)?, settings))
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            let json = self
                .client
                .call(&self.model, "batchEmbedContents", &self.request_body(batch))
                .await?;
            let vectors = parse_batch_response(&json)?;
            if vectors.len() != batch.len() {
                bail!(
                    "Embedding count mismatch: sent {}, received {}",
                    batch.len(),
                    vectors.len()
                );
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Extract `embeddings[].values` in order.
fn parse_batch_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    data.iter()
        .map(|item| {
            let values = item
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
            Ok(values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
