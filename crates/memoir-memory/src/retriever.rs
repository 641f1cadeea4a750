// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retrieval pipeline.
//!
//! Adaptive noise filter, query embedding, concurrent vector + lexical
//! candidate recall, union-merge by id, optional cross-encoder rerank,
//! multi-signal scoring, threshold filter, top-K truncation. Access-count
//! updates for returned memories are fire-and-forget through the write
//! queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use memoir_config::{RetrievalConfig, ScoringConfig};
use memoir_core::{now_ms, EmbeddingCapability, MemoirError, RerankCapability};

use crate::noise::is_noise;
use crate::scorer::{score_candidates, Candidate};
use crate::store::MemoryStore;
use crate::types::{RecallOptions, RetrievalResult};

/// Orchestrates the hybrid retrieval pipeline.
pub struct Retriever {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn EmbeddingCapability>,
    reranker: Option<Arc<dyn RerankCapability>>,
    retrieval: RetrievalConfig,
    scoring: ScoringConfig,
    noise_filter: bool,
}

impl Retriever {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn EmbeddingCapability>,
        reranker: Option<Arc<dyn RerankCapability>>,
        retrieval: RetrievalConfig,
        scoring: ScoringConfig,
        noise_filter: bool,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            retrieval,
            scoring,
            noise_filter,
        }
    }

    /// Runs the pipeline for one query.
    ///
    /// Noise queries return an empty result without touching the store or
    /// the embedding capability. Rerank failures are non-fatal.
    pub async fn retrieve(
        &self,
        query: &str,
        opts: &RecallOptions,
    ) -> Result<RetrievalResult, MemoirError> {
        let started = Instant::now();
        let trimmed = query.trim();

        if self.noise_filter && is_noise(trimmed) {
            debug!("noise query filtered before retrieval");
            return Ok(RetrievalResult::empty(query));
        }

        let limit = opts.limit.unwrap_or(self.retrieval.limit);
        let min_score = opts.min_score.unwrap_or(self.retrieval.min_score);
        let scope = opts.scope.as_ref();
        let categories = opts.categories.as_deref();
        let candidate_limit = limit.max(1) * self.retrieval.candidate_multiplier.max(1);

        let query_vector = self.embedder.embed(trimmed).await?;

        // Both recall legs run concurrently; the lexical leg degrades to
        // empty on engine-side failures.
        let vector_leg = self.store.vector_search(
            &query_vector,
            candidate_limit,
            scope,
            categories,
            None,
        );
        let (vector_hits, lexical_hits) = if self.retrieval.hybrid {
            let lexical_leg =
                self.store
                    .full_text_search(trimmed, candidate_limit, scope, categories);
            let (vector_hits, lexical_hits) = tokio::join!(vector_leg, lexical_leg);
            (vector_hits?, lexical_hits?)
        } else {
            (vector_leg.await?, Vec::new())
        };

        // Union by id; a side that missed a candidate contributes 0.
        let mut merged: HashMap<String, Candidate> = HashMap::new();
        for (memory, distance) in vector_hits {
            let id = memory.id.clone();
            merged.insert(
                id,
                Candidate {
                    memory,
                    vector_score: (1.0 - distance).clamp(0.0, 1.0),
                    bm25_raw: 0.0,
                    rerank_raw: None,
                },
            );
        }
        for (memory, relevance) in lexical_hits {
            merged
                .entry(memory.id.clone())
                .and_modify(|c| c.bm25_raw = relevance)
                .or_insert(Candidate {
                    memory,
                    vector_score: 0.0,
                    bm25_raw: relevance,
                    rerank_raw: None,
                });
        }

        let total_found = merged.len();
        let mut candidates: Vec<Candidate> = merged.into_values().collect();

        if let Some(reranker) = &self.reranker {
            if !candidates.is_empty() {
                self.apply_rerank(reranker.as_ref(), trimmed, &mut candidates)
                    .await;
            }
        }

        let mut scored = score_candidates(candidates, &self.scoring, now_ms());
        scored.retain(|s| s.score >= min_score);
        scored.truncate(limit);

        // Best-effort access bumps; the result does not wait on them.
        for hit in &scored {
            let store = self.store.clone();
            let id = hit.memory.id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.increment_access_count(&id).await {
                    debug!(id = %id, "access bump failed: {e}");
                }
            });
        }

        Ok(RetrievalResult {
            memories: scored,
            query: query.to_string(),
            total_found,
            timing_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Documents are `headline + "\n" + summary`; returned indices map back
    /// into the candidate list. Failures leave the candidates unscored.
    async fn apply_rerank(
        &self,
        reranker: &dyn RerankCapability,
        query: &str,
        candidates: &mut [Candidate],
    ) {
        let documents: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}\n{}", c.memory.headline, c.memory.summary))
            .collect();
        match reranker.rerank(query, &documents).await {
            Ok(results) => {
                for result in results {
                    if let Some(candidate) = candidates.get_mut(result.index) {
                        candidate.rerank_raw = Some(result.score);
                    }
                }
            }
            Err(e) => {
                warn!("rerank failed, continuing without rerank scores: {e}");
            }
        }
    }
}
