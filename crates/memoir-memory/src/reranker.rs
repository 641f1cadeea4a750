// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cohere-style cross-encoder rerank client.

use async_trait::async_trait;
use serde_json::{json, Value};

use memoir_config::RerankerConfig;
use memoir_core::{MemoirError, RerankCapability, RerankResult};

use crate::http::{build_client, endpoint, post_json};

const DEFAULT_BASE_URL: &str = "https://api.cohere.com/v2";

/// HTTP implementation of the rerank capability.
#[derive(Debug, Clone)]
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self, MemoirError> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            client: build_client(config.api_key.as_deref())?,
            url: endpoint(base_url, "rerank"),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl RerankCapability for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankResult>, MemoirError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
        });

        let response = post_json(&self.client, &self.url, &body, "rerank").await?;
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| MemoirError::capability("rerank: response missing results array"))?;

        let mut out = Vec::with_capacity(results.len());
        for item in results {
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .ok_or_else(|| MemoirError::capability("rerank: result missing index"))?
                as usize;
            if index >= documents.len() {
                return Err(MemoirError::capability(format!(
                    "rerank: index {index} out of range for {} documents",
                    documents.len()
                )));
            }
            let score = item
                .get("relevance_score")
                .and_then(Value::as_f64)
                .ok_or_else(|| MemoirError::capability("rerank: result missing relevance_score"))?
                as f32;
            out.push(RerankResult { index, score });
        }
        Ok(out)
    }
}
