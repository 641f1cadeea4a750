// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerank capability trait for cross-encoder reordering.

use async_trait::async_trait;

use crate::error::MemoirError;
use crate::types::RerankResult;

/// Capability that scores (query, document) pairs jointly and is used to
/// reorder a candidate list produced by cheaper retrievers.
#[async_trait]
pub trait RerankCapability: Send + Sync {
    /// Scores every document against the query. Returned indices refer back
    /// into the input array; order and completeness are provider-defined.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankResult>, MemoirError>;
}
