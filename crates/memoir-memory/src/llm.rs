// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completion client used for extraction and dedup
//! decisions.

use async_trait::async_trait;
use serde_json::{json, Value};

use memoir_config::LlmConfig;
use memoir_core::{ChatMessage, LlmCapability, MemoirError};

use crate::http::{build_client, endpoint, post_json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP implementation of the LLM capability.
#[derive(Debug, Clone)]
pub struct HttpLlm {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpLlm {
    pub fn new(config: &LlmConfig) -> Result<Self, MemoirError> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            client: build_client(config.api_key.as_deref())?,
            url: endpoint(base_url, "chat/completions"),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmCapability for HttpLlm {
    /// Sends a completion request. With `json_mode` the provider is asked
    /// for a JSON object response; callers still parse defensively.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        json_mode: bool,
    ) -> Result<String, MemoirError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = post_json(&self.client, &self.url, &body, "completion").await?;
        response
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MemoirError::capability("completion: response carried no content"))
    }
}
