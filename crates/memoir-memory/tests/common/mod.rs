// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability doubles shared by the engine integration tests.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use memoir_core::{ChatMessage, EmbeddingCapability, LlmCapability, MemoirError};

pub const DIMS: usize = 64;

/// Deterministic bag-of-words embedder. Equal texts embed identically and
/// token overlap translates into cosine similarity, which is enough to
/// drive retrieval and dedup end to end without a model.
pub struct TestEmbedder;

impl TestEmbedder {
    pub fn embed_text(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; DIMS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() % DIMS as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingCapability for TestEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        Ok(Self::embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoirError> {
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn provider(&self) -> &str {
        "test"
    }
}

/// LLM double replaying scripted responses, then repeating the last one.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = responses.into_iter().map(Into::into).collect();
        let fallback = queue.back().cloned().unwrap_or_else(|| "[]".to_string());
        Self {
            responses: Mutex::new(queue),
            fallback,
        }
    }
}

#[async_trait]
impl LlmCapability for ScriptedLlm {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _json_mode: bool,
    ) -> Result<String, MemoirError> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
