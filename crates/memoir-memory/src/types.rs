// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the long-term memory engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use memoir_core::{now_ms, MemoryCategory, MemoryScope};

/// Version stamp written into export payloads.
pub const EXPORT_VERSION: &str = "1.0.0";

/// A persistent, addressable unit of recall.
///
/// Carries three abstraction levels of the same fact: `headline` (terse,
/// target <= 15 words), `summary` (2-4 sentences), and `content` (full
/// narrative).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Canonical UUID, assigned at insert. Immutable.
    pub id: String,
    /// Terse one-liner used in compact context injection.
    pub headline: String,
    /// Default context level.
    pub summary: String,
    /// Full narrative.
    pub content: String,
    /// Controls merge rules during deduplication.
    pub category: MemoryCategory,
    /// Partitioning dimension.
    pub scope: MemoryScope,
    /// Clamped to [0, 1] on ingest.
    pub importance: f32,
    /// Order-preserving tag list.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Application-defined, not indexed.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Unix-millisecond creation timestamp.
    pub created_at: i64,
    /// Unix-millisecond last-mutation timestamp.
    pub updated_at: i64,
    /// Unix-millisecond timestamp of the last recall hit, if any.
    #[serde(default)]
    pub last_accessed_at: Option<i64>,
    /// Number of recall hits (best-effort).
    #[serde(default)]
    pub access_count: u64,
    /// Embedding vector. Required in the persisted row, optional in API
    /// projections (lists, exports).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Memory {
    /// Builds a fresh record from an extracted candidate.
    pub fn from_extracted(
        candidate: &ExtractedMemory,
        scope: MemoryScope,
        vector: Vec<f32>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            headline: candidate.headline.clone(),
            summary: candidate.summary.clone(),
            content: candidate.content.clone(),
            category: candidate.category,
            scope,
            importance: candidate.importance.clamp(0.0, 1.0),
            tags: candidate.tags.clone(),
            metadata: candidate.metadata.clone(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            vector: Some(vector),
        }
    }

    /// The text every embedding of this memory is computed over.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.headline, &self.summary, &self.content)
    }

    /// Projection without the embedding vector, for lists and exports.
    pub fn without_vector(mut self) -> Self {
        self.vector = None;
        self
    }
}

/// Canonical concatenation embedded for a memory's three text levels.
pub fn embedding_text(headline: &str, summary: &str, content: &str) -> String {
    format!("{headline}\n{summary}\n{content}")
}

/// A candidate produced by the extractor, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMemory {
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub category: MemoryCategory,
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExtractedMemory {
    /// Validating constructor from one element of the LLM's JSON output.
    ///
    /// Returns `None` for items missing any of `headline`, `summary`,
    /// `content`, or with a category outside the closed set. `importance`
    /// is clamped to [0, 1]; missing tags/metadata become empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let headline = non_empty_str(obj.get("headline")?)?;
        let summary = non_empty_str(obj.get("summary")?)?;
        let content = non_empty_str(obj.get("content")?)?;
        let category: MemoryCategory = obj.get("category")?.as_str()?.parse().ok()?;
        let importance = obj
            .get("importance")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0) as f32;
        let tags = obj
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self {
            headline,
            summary,
            content,
            category,
            importance,
            tags,
            metadata,
        })
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// A memory annotated with the retrieval signals that ranked it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Final combined score in [0, 1].
    pub score: f32,
    /// Vector similarity (1 - cosine distance), 0 when absent.
    pub vector_score: f32,
    /// Normalised lexical score, 0 when absent.
    pub bm25_score: f32,
    /// Normalised rerank score, when a reranker ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// Result of one retrieval-pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    /// Ranked, threshold-filtered, truncated results.
    pub memories: Vec<ScoredMemory>,
    /// The query as received.
    pub query: String,
    /// Size of the merged candidate set before scoring and truncation.
    pub total_found: usize,
    /// Wall-clock duration of the pipeline.
    pub timing_ms: u64,
}

impl RetrievalResult {
    /// An empty result, used by the adaptive noise filter.
    pub fn empty(query: &str) -> Self {
        Self {
            memories: Vec::new(),
            query: query.to_string(),
            total_found: 0,
            timing_ms: 0,
        }
    }
}

/// Per-call overrides for `recall`.
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Overrides `retrieval.limit`.
    pub limit: Option<usize>,
    /// Overrides `retrieval.min_score`.
    pub min_score: Option<f32>,
    /// Restricts results to one scope; defaults to the configured scope.
    pub scope: Option<MemoryScope>,
    /// Restricts results to these categories; `None` means all.
    pub categories: Option<Vec<MemoryCategory>>,
}

/// Options for `store`.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub scope: Option<MemoryScope>,
    /// Importance for the stored record(s); defaults to 0.5 for direct
    /// inserts.
    pub importance: Option<f32>,
    /// Tags unioned into every stored record.
    pub tags: Vec<String>,
    /// Metadata merged into every stored record.
    pub metadata: Map<String, Value>,
    /// Insert the text directly instead of running the extractor.
    pub skip_extraction: bool,
}

/// Abstraction level used by context assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContextLevel {
    /// L0: headline only.
    Headline,
    /// L1: structured summary.
    #[default]
    Summary,
    /// L2: full narrative.
    Narrative,
}

/// Sort key for `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    Importance,
    AccessCount,
}

/// Sort direction for `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

/// Filter and paging for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub scope: Option<MemoryScope>,
    pub category: Option<MemoryCategory>,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Partial update applied to an existing memory. `None` fields keep their
/// current values.
#[derive(Debug, Clone, Default)]
pub struct MemoryDelta {
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<MemoryCategory>,
    pub scope: Option<MemoryScope>,
    pub importance: Option<f32>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Map<String, Value>>,
    pub vector: Option<Vec<f32>>,
}

impl MemoryDelta {
    /// True when any of the three text levels changes, which forces a
    /// re-embed of the post-merge concatenation.
    pub fn touches_text(&self) -> bool {
        self.headline.is_some() || self.summary.is_some() || self.content.is_some()
    }
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    /// Counts for every category, zero-filled.
    pub by_category: BTreeMap<MemoryCategory, u64>,
    /// Counts per scope string; empty when the table is empty.
    pub by_scope: BTreeMap<String, u64>,
    /// Mean importance, 0 when the table is empty.
    pub avg_importance: f32,
    /// Oldest `created_at`, absent when the table is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_created_at: Option<i64>,
    /// Newest `created_at`, absent when the table is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_created_at: Option<i64>,
}

impl MemoryStats {
    /// Stats of an empty table: zero counts, no timestamps.
    pub fn empty() -> Self {
        let mut by_category = BTreeMap::new();
        for cat in MemoryCategory::ALL {
            by_category.insert(cat, 0);
        }
        Self {
            total: 0,
            by_category,
            by_scope: BTreeMap::new(),
            avg_importance: 0.0,
            oldest_created_at: None,
            newest_created_at: None,
        }
    }

    /// Aggregates from projected scalar rows.
    pub fn from_parts<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (MemoryCategory, String, f32, i64)>,
    {
        let mut stats = Self::empty();
        let mut importance_sum = 0.0_f64;
        for (category, scope, importance, created_at) in parts {
            stats.total += 1;
            *stats.by_category.entry(category).or_insert(0) += 1;
            *stats.by_scope.entry(scope).or_insert(0) += 1;
            importance_sum += f64::from(importance);
            stats.oldest_created_at = Some(match stats.oldest_created_at {
                Some(t) => t.min(created_at),
                None => created_at,
            });
            stats.newest_created_at = Some(match stats.newest_created_at {
                Some(t) => t.max(created_at),
                None => created_at,
            });
        }
        if stats.total > 0 {
            stats.avg_importance = (importance_sum / stats.total as f64) as f32;
        }
        stats
    }

    /// Aggregates from full memory rows (used by export).
    pub fn from_memories(memories: &[Memory]) -> Self {
        Self::from_parts(memories.iter().map(|m| {
            (
                m.category,
                m.scope.to_string(),
                m.importance,
                m.created_at,
            )
        }))
    }
}

/// Export payload: versioned snapshot of memories plus their stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: String,
    pub exported_at: i64,
    pub memories: Vec<Memory>,
    pub stats: MemoryStats,
}

/// JSON-encodes tags for the persisted column.
pub(crate) fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Parses the persisted tag column, falling back to an empty list.
pub(crate) fn tags_from_json(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// JSON-encodes metadata for the persisted column.
pub(crate) fn metadata_to_json(metadata: &Map<String, Value>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// Parses the persisted metadata column, falling back to an empty map.
pub(crate) fn metadata_from_json(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Char-boundary-safe prefix of at most `max_chars` characters.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
