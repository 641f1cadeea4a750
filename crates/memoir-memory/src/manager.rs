// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public façade over the memory engine.
//!
//! One handle per process: `MemoryManager::open` builds the HTTP
//! capabilities from config, `with_capabilities` injects pluggable
//! implementations (tests use doubles against temp directories), `close`
//! ends the lifecycle. Per ingested candidate the state machine is
//! SKIP -> discard, CREATE -> embed + insert, MERGE -> re-embed merged
//! text + update target.

use std::sync::Arc;

use tracing::{debug, warn};

use memoir_config::{validate_config, MemoirConfig};
use memoir_core::{
    now_ms, ChatMessage, EmbeddingCapability, LlmCapability, MemoirError, MemoryCategory,
    MemoryScope, RerankCapability,
};

use crate::context::build_context_block;
use crate::dedup::{DedupDecision, Deduplicator};
use crate::embedder::HttpEmbedder;
use crate::extractor::Extractor;
use crate::llm::HttpLlm;
use crate::reranker::HttpReranker;
use crate::retriever::Retriever;
use crate::store::MemoryStore;
use crate::types::{
    embedding_text, truncate_chars, ContextLevel, ExportPayload, ExtractedMemory, ListFilter,
    Memory, MemoryDelta, MemoryStats, RecallOptions, RetrievalResult, StoreOptions,
    EXPORT_VERSION,
};

/// Direct stores take the first 100 chars as the headline.
const DIRECT_HEADLINE_CHARS: usize = 100;
/// Direct stores take the first 300 chars as the summary.
const DIRECT_SUMMARY_CHARS: usize = 300;

/// Engine façade: ingestion, retrieval, manual store, update, forget,
/// list, stats, export/import, re-embed.
pub struct MemoryManager {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn EmbeddingCapability>,
    retriever: Retriever,
    extractor: Extractor,
    dedup: Deduplicator,
    default_scope: MemoryScope,
    auto_recall: bool,
    recall_limit: usize,
    recall_min_score: f32,
}

impl MemoryManager {
    /// Opens the engine with HTTP capability clients built from config.
    pub async fn open(config: MemoirConfig) -> Result<Self, MemoirError> {
        let embedder: Arc<dyn EmbeddingCapability> =
            Arc::new(HttpEmbedder::new(&config.embedding)?);
        let llm: Arc<dyn LlmCapability> = Arc::new(HttpLlm::new(&config.llm)?);
        let reranker: Option<Arc<dyn RerankCapability>> = match &config.retrieval.reranker {
            Some(reranker_config) => Some(Arc::new(HttpReranker::new(reranker_config)?)),
            None => None,
        };
        Self::with_capabilities(config, embedder, llm, reranker).await
    }

    /// Opens the engine with injected capabilities.
    pub async fn with_capabilities(
        config: MemoirConfig,
        embedder: Arc<dyn EmbeddingCapability>,
        llm: Arc<dyn LlmCapability>,
        reranker: Option<Arc<dyn RerankCapability>>,
    ) -> Result<Self, MemoirError> {
        if let Err(errors) = validate_config(&config) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(MemoirError::Config(messages.join("; ")));
        }
        let default_scope = MemoryScope::parse(&config.default_scope)?;

        let store = Arc::new(MemoryStore::open(&config.db_path, embedder.dimensions()).await?);

        let retriever = Retriever::new(
            store.clone(),
            embedder.clone(),
            reranker,
            config.retrieval.clone(),
            config.scoring.clone(),
            config.capture.noise_filter,
        );
        let extractor = Extractor::new(llm.clone(), config.capture.clone());
        let dedup = Deduplicator::new(store.clone(), llm, config.deduplication.clone());

        Ok(Self {
            store,
            embedder,
            retriever,
            extractor,
            dedup,
            default_scope,
            auto_recall: config.auto_recall,
            recall_limit: config.recall_limit,
            recall_min_score: config.recall_min_score,
        })
    }

    /// Ends the handle's lifecycle.
    pub fn close(self) {
        debug!("memory manager closed");
    }

    /// Store reachability check.
    pub async fn health(&self) -> bool {
        self.store.count().await.is_ok()
    }

    /// Ingests one (user, assistant) turn. Returns the memories created or
    /// merged by it.
    pub async fn process_turn(
        &self,
        user_message: &str,
        assistant_response: &str,
        scope: Option<MemoryScope>,
        existing_context: &[ChatMessage],
    ) -> Result<Vec<Memory>, MemoirError> {
        let candidates = self
            .extractor
            .extract_from_turn(user_message, assistant_response, existing_context)
            .await?;
        self.apply_candidates(candidates, self.scope_or_default(scope))
            .await
    }

    /// Ingests a full conversation history.
    pub async fn process_session(
        &self,
        history: &[ChatMessage],
        scope: Option<MemoryScope>,
    ) -> Result<Vec<Memory>, MemoirError> {
        let candidates = self.extractor.extract_from_session(history).await?;
        self.apply_candidates(candidates, self.scope_or_default(scope))
            .await
    }

    /// Manually stores content under a category.
    ///
    /// By default the extractor distils the text (the given category
    /// overriding whatever it emits); with `skip_extraction`, or when the
    /// extraction comes back empty, a single record is built directly from
    /// the text.
    pub async fn store(
        &self,
        content: &str,
        category: MemoryCategory,
        opts: StoreOptions,
    ) -> Result<Vec<Memory>, MemoirError> {
        let scope = self.scope_or_default(opts.scope.clone());

        let candidates = if opts.skip_extraction {
            vec![self.direct_candidate(content, category, &opts)]
        } else {
            let mut extracted = self.extractor.extract_from_text(content).await?;
            for candidate in &mut extracted {
                candidate.category = category;
                if let Some(importance) = opts.importance {
                    candidate.importance = importance.clamp(0.0, 1.0);
                }
                for tag in &opts.tags {
                    if !candidate.tags.contains(tag) {
                        candidate.tags.push(tag.clone());
                    }
                }
                for (key, value) in &opts.metadata {
                    candidate.metadata.insert(key.clone(), value.clone());
                }
            }
            if extracted.is_empty() {
                vec![self.direct_candidate(content, category, &opts)]
            } else {
                extracted
            }
        };

        self.apply_candidates(candidates, scope).await
    }

    /// Runs the hybrid retrieval pipeline.
    pub async fn recall(
        &self,
        query: &str,
        mut opts: RecallOptions,
    ) -> Result<RetrievalResult, MemoirError> {
        if opts.scope.is_none() {
            opts.scope = Some(self.default_scope.clone());
        }
        self.retriever.retrieve(query, &opts).await
    }

    /// Projects a recall into a delimiter-wrapped text block at the given
    /// abstraction level. Honours `auto_recall`, `recall_limit`, and
    /// `recall_min_score`.
    pub async fn build_context(
        &self,
        query: &str,
        mut opts: RecallOptions,
        level: ContextLevel,
    ) -> Result<String, MemoirError> {
        if !self.auto_recall {
            return Ok(String::new());
        }
        if opts.limit.is_none() {
            opts.limit = Some(self.recall_limit);
        }
        if opts.min_score.is_none() {
            opts.min_score = Some(self.recall_min_score);
        }
        let result = self.recall(query, opts).await?;
        Ok(build_context_block(&result.memories, level))
    }

    /// Deletes one memory. Returns whether it existed.
    pub async fn forget(&self, id: &str) -> Result<bool, MemoirError> {
        self.store.delete(id).await
    }

    /// Deletes several memories; returns the count removed.
    pub async fn forget_many(&self, ids: &[String]) -> Result<usize, MemoirError> {
        self.store.delete_many(ids).await
    }

    /// Deletes every memory in a scope; returns the count removed.
    pub async fn forget_by_scope(&self, scope: &MemoryScope) -> Result<usize, MemoirError> {
        self.store.delete_by_scope(scope).await
    }

    /// Zero-or-one lookup.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, MemoirError> {
        self.store.get_by_id(id).await
    }

    /// Applies a partial update. When any of the three text levels
    /// changes, the vector is recomputed from the post-merge
    /// concatenation.
    pub async fn update(
        &self,
        id: &str,
        mut delta: MemoryDelta,
    ) -> Result<Option<Memory>, MemoirError> {
        if delta.touches_text() && delta.vector.is_none() {
            let Some(current) = self.store.get_by_id(id).await? else {
                return Ok(None);
            };
            let headline = delta.headline.as_deref().unwrap_or(&current.headline);
            let summary = delta.summary.as_deref().unwrap_or(&current.summary);
            let content = delta.content.as_deref().unwrap_or(&current.content);
            let vector = self
                .embedder
                .embed(&embedding_text(headline, summary, content))
                .await?;
            delta.vector = Some(vector);
        }
        self.store.update(id, delta).await
    }

    /// Administrative paging.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<Memory>, MemoirError> {
        self.store.list(filter).await
    }

    /// Aggregate counts.
    pub async fn get_stats(&self) -> Result<MemoryStats, MemoirError> {
        self.store.get_stats().await
    }

    /// Materialises a versioned snapshot of the given scope (or all
    /// scopes). Vectors are not exported; import re-embeds.
    pub async fn export(&self, scope: Option<MemoryScope>) -> Result<ExportPayload, MemoirError> {
        let memories = self
            .store
            .list(&ListFilter {
                scope,
                ..Default::default()
            })
            .await?;
        let stats = MemoryStats::from_memories(&memories);
        Ok(ExportPayload {
            version: EXPORT_VERSION.to_string(),
            exported_at: now_ms(),
            memories,
            stats,
        })
    }

    /// Inserts each payload memory afresh: new id, fresh timestamps,
    /// re-embedded vector, optional scope override. Per-memory failures
    /// are logged and skipped; returns the count imported.
    pub async fn import(
        &self,
        payload: &ExportPayload,
        override_scope: Option<MemoryScope>,
    ) -> Result<usize, MemoirError> {
        let mut imported = 0;
        for memory in &payload.memories {
            let vector = match self.embedder.embed(&memory.embedding_text()).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(headline = %memory.headline, "import embed failed, skipping: {e}");
                    continue;
                }
            };
            let now = now_ms();
            let row = Memory {
                id: uuid::Uuid::new_v4().to_string(),
                headline: memory.headline.clone(),
                summary: memory.summary.clone(),
                content: memory.content.clone(),
                category: memory.category,
                scope: override_scope.clone().unwrap_or_else(|| memory.scope.clone()),
                importance: memory.importance.clamp(0.0, 1.0),
                tags: memory.tags.clone(),
                metadata: memory.metadata.clone(),
                created_at: now,
                updated_at: now,
                last_accessed_at: None,
                access_count: 0,
                vector: Some(vector),
            };
            match self.store.insert(row).await {
                Ok(_) => imported += 1,
                Err(e) => warn!(headline = %memory.headline, "import insert failed, skipping: {e}"),
            }
        }
        Ok(imported)
    }

    /// Recomputes the vector of every memory in scope. Per-memory errors
    /// are swallowed; returns the count successfully re-embedded.
    pub async fn reembed(&self, scope: Option<MemoryScope>) -> Result<usize, MemoirError> {
        let memories = self
            .store
            .list(&ListFilter {
                scope,
                ..Default::default()
            })
            .await?;

        let mut reembedded = 0;
        for memory in memories {
            let vector = match self.embedder.embed(&memory.embedding_text()).await {
                Ok(vector) => vector,
                Err(e) => {
                    debug!(id = %memory.id, "re-embed failed: {e}");
                    continue;
                }
            };
            let delta = MemoryDelta {
                vector: Some(vector),
                ..Default::default()
            };
            match self.store.update(&memory.id, delta).await {
                Ok(Some(_)) => reembedded += 1,
                Ok(None) => debug!(id = %memory.id, "memory vanished during re-embed"),
                Err(e) => debug!(id = %memory.id, "re-embed update failed: {e}"),
            }
        }
        Ok(reembedded)
    }

    // --- internals ---

    fn scope_or_default(&self, scope: Option<MemoryScope>) -> MemoryScope {
        scope.unwrap_or_else(|| self.default_scope.clone())
    }

    fn direct_candidate(
        &self,
        content: &str,
        category: MemoryCategory,
        opts: &StoreOptions,
    ) -> ExtractedMemory {
        ExtractedMemory {
            headline: truncate_chars(content, DIRECT_HEADLINE_CHARS).to_string(),
            summary: truncate_chars(content, DIRECT_SUMMARY_CHARS).to_string(),
            content: content.to_string(),
            category,
            importance: opts.importance.unwrap_or(0.5).clamp(0.0, 1.0),
            tags: opts.tags.clone(),
            metadata: opts.metadata.clone(),
        }
    }

    /// Applies the per-candidate state machine: embed, decide, then
    /// insert / update / discard. An embedding failure skips just that
    /// candidate.
    async fn apply_candidates(
        &self,
        candidates: Vec<ExtractedMemory>,
        scope: MemoryScope,
    ) -> Result<Vec<Memory>, MemoirError> {
        let mut applied = Vec::new();
        for candidate in candidates {
            let text = embedding_text(&candidate.headline, &candidate.summary, &candidate.content);
            let vector = match self.embedder.embed(&text).await {
                Ok(vector) => vector,
                Err(e) => {
                    debug!(headline = %candidate.headline, "embed failed, skipping candidate: {e}");
                    continue;
                }
            };

            match self.dedup.decide(&candidate, &scope, &vector).await? {
                DedupDecision::Create => {
                    let memory = Memory::from_extracted(&candidate, scope.clone(), vector);
                    applied.push(self.store.insert(memory).await?);
                }
                DedupDecision::Merge {
                    target_id,
                    headline,
                    summary,
                    content,
                    tags,
                } => {
                    let merged_vector = match self
                        .embedder
                        .embed(&embedding_text(&headline, &summary, &content))
                        .await
                    {
                        Ok(vector) => vector,
                        Err(e) => {
                            debug!(target_id = %target_id, "merge re-embed failed, skipping: {e}");
                            continue;
                        }
                    };
                    let delta = MemoryDelta {
                        headline: Some(headline),
                        summary: Some(summary),
                        content: Some(content),
                        tags: Some(tags),
                        vector: Some(merged_vector),
                        ..Default::default()
                    };
                    if let Some(updated) = self.store.update(&target_id, delta).await? {
                        applied.push(updated);
                    }
                }
                DedupDecision::Skip => {
                    debug!(headline = %candidate.headline, "skipped duplicate candidate");
                }
            }
        }
        Ok(applied)
    }
}
