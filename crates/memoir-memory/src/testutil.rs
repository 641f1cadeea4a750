// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic capability doubles for unit tests.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use memoir_core::{
    ChatMessage, EmbeddingCapability, LlmCapability, MemoirError, RerankCapability, RerankResult,
};

/// Deterministic bag-of-words embedder: token hashes bucket into the
/// vector, L2-normalised. Equal texts embed identically; texts sharing
/// tokens are cosine-similar.
pub(crate) struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub(crate) fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub(crate) fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dims as u64) as usize;
            v[bucket] += 1.0;
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
impl EmbeddingCapability for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoirError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider(&self) -> &str {
        "hash-test"
    }
}

/// LLM double that replays scripted responses in order, then repeats the
/// last one.
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    pub(crate) calls: AtomicUsize,
}

impl ScriptedLlm {
    pub(crate) fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = responses.into_iter().map(Into::into).collect();
        let last = queue.back().cloned().unwrap_or_else(|| "[]".to_string());
        Self {
            responses: Mutex::new(queue),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.responses.lock().unwrap();
        match queue.pop_front() {
            Some(response) => {
                if queue.is_empty() {
                    *self.last.lock().unwrap() = response.clone();
                }
                Ok(response)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

/// Reranker double scoring documents by a keyword hit.
pub(crate) struct KeywordReranker {
    pub(crate) keyword: String,
}

#[async_trait]
impl RerankCapability for KeywordReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankResult>, MemoirError> {
        Ok(documents
            .iter()
            .enumerate()
            .map(|(index, doc)| RerankResult {
                index,
                score: if doc.to_lowercase().contains(&self.keyword) {
                    10.0
                } else {
                    1.0
                },
            })
            .collect())
    }
}

/// Reranker double that always fails transport.
pub(crate) struct BrokenReranker;

#[async_trait]
impl RerankCapability for BrokenReranker {
    async fn rerank(
        &self,
        _query: &str,
        _documents: &[String],
    ) -> Result<Vec<RerankResult>, MemoirError> {
        Err(MemoirError::capability("rerank endpoint unreachable"))
    }
}
