// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding capability trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::MemoirError;

/// Capability for generating vector embeddings from text.
///
/// Powers semantic search, deduplication, and retrieval. Implementations
/// must be deterministic for equal inputs so that dedup reasoning is stable.
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    /// Embeds a single text into a vector of `dimensions()` floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError>;

    /// Embeds a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoirError>;

    /// Dimensionality of every vector this capability produces.
    fn dimensions(&self) -> usize;

    /// Provider tag for diagnostics (e.g. "openai", "ollama").
    fn provider(&self) -> &str;
}
