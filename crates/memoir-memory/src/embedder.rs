// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible embedding client.
//!
//! Works against any endpoint speaking the `/embeddings` shape (OpenAI,
//! local inference servers, gateway proxies) selected by
//! `embedding.{provider, model, api_key, base_url, dimensions}`.

use async_trait::async_trait;
use serde_json::{json, Value};

use memoir_config::EmbeddingConfig;
use memoir_core::{EmbeddingCapability, MemoirError};

use crate::http::{build_client, endpoint, post_json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP implementation of the embedding capability.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    provider: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, MemoirError> {
        if config.dimensions == 0 {
            return Err(MemoirError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            client: build_client(config.api_key.as_deref())?,
            url: endpoint(base_url, "embeddings"),
            model: config.model.clone(),
            provider: config.provider.clone(),
            dimensions: config.dimensions,
        })
    }

    fn parse_embeddings(&self, value: &Value, expected: usize) -> Result<Vec<Vec<f32>>, MemoirError> {
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| MemoirError::capability("embeddings: response missing data array"))?;

        let mut out: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (position, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .map(|i| i as usize)
                .unwrap_or(position);
            let embedding: Vec<f32> = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    MemoirError::capability("embeddings: response item missing embedding")
                })?
                .iter()
                .filter_map(Value::as_f64)
                .map(|f| f as f32)
                .collect();
            if embedding.len() != self.dimensions {
                return Err(MemoirError::capability(format!(
                    "embeddings: provider returned {} dims, configured for {}",
                    embedding.len(),
                    self.dimensions
                )));
            }
            out.push((index, embedding));
        }

        if out.len() != expected {
            return Err(MemoirError::capability(format!(
                "embeddings: expected {expected} vectors, provider returned {}",
                out.len()
            )));
        }

        out.sort_by_key(|(index, _)| *index);
        Ok(out.into_iter().map(|(_, embedding)| embedding).collect())
    }
}

#[async_trait]
impl EmbeddingCapability for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| MemoirError::capability("embeddings: empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoirError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let response = post_json(&self.client, &self.url, &body, "embeddings").await?;
        self.parse_embeddings(&response, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}
