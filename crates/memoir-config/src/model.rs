// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Memoir memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! keys at load time. Every section is optional and defaults to sensible
//! values; the host process is responsible for reading the file and the
//! environment overlay — the engine only consumes the validated object.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoirConfig {
    /// Filesystem location of the store directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Scope used when a caller omits one. Must match the scope grammar.
    #[serde(default = "default_scope")]
    pub default_scope: String,

    /// Embedding capability selection.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// LLM capability selection (extraction and dedup decisions).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval-pipeline knobs.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Scorer knobs.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Deduplicator policy.
    #[serde(default)]
    pub deduplication: DeduplicationConfig,

    /// Extractor gating.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Whether `build_context` runs recall at all.
    #[serde(default = "default_true")]
    pub auto_recall: bool,

    /// Recall limit used by `build_context`.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Minimum score used by `build_context`.
    #[serde(default = "default_recall_min_score")]
    pub recall_min_score: f32,

    /// Diagnostic logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for MemoirConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            default_scope: default_scope(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            scoring: ScoringConfig::default(),
            deduplication: DeduplicationConfig::default(),
            capture: CaptureConfig::default(),
            auto_recall: true,
            recall_limit: default_recall_limit(),
            recall_min_score: default_recall_min_score(),
            debug: false,
        }
    }
}

fn default_db_path() -> String {
    "./memoir-data".to_string()
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_true() -> bool {
    true
}

fn default_recall_limit() -> usize {
    5
}

fn default_recall_min_score() -> f32 {
    0.3
}

/// Embedding capability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Provider tag (e.g. "openai", any OpenAI-compatible endpoint).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key, if the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override (e.g. a local inference server).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Dimensionality of the produced vectors. Fixed at table creation.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: default_dimensions(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

/// LLM capability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Chat model used for extraction and dedup decisions.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key, if the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.2
}

/// Retrieval-pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Number of memories returned by default.
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Results scoring below this are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// When false, the lexical leg of the pipeline is skipped.
    #[serde(default = "default_true")]
    pub hybrid: bool,

    /// Candidate recall fetches `limit * candidate_multiplier` per leg.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Optional cross-encoder rerank capability.
    #[serde(default)]
    pub reranker: Option<RerankerConfig>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_retrieval_limit(),
            min_score: default_min_score(),
            hybrid: true,
            candidate_multiplier: default_candidate_multiplier(),
            reranker: None,
        }
    }
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.3
}

fn default_candidate_multiplier() -> usize {
    3
}

/// Rerank capability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RerankerConfig {
    /// Rerank model name.
    pub model: String,

    /// API key, if the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the rerank endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Scorer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weight of the vector-similarity signal.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the normalised lexical signal.
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,

    /// Weight of the normalised rerank signal.
    #[serde(default = "default_reranker_weight")]
    pub reranker_weight: f32,

    /// Recency boost decays linearly to zero over this many days.
    #[serde(default = "default_recency_boost_days")]
    pub recency_boost_days: f32,

    /// Maximum additive recency boost.
    #[serde(default = "default_recency_boost_factor")]
    pub recency_boost_factor: f32,

    /// Multiplier applied to `importance` as an additive boost.
    #[serde(default = "default_importance_weight")]
    pub importance_weight: f32,

    /// Age in days after which the time penalty starts.
    #[serde(default = "default_time_penalty_days")]
    pub time_penalty_days: f32,

    /// Maximum multiplicative time penalty.
    #[serde(default = "default_time_penalty_factor")]
    pub time_penalty_factor: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            bm25_weight: default_bm25_weight(),
            reranker_weight: default_reranker_weight(),
            recency_boost_days: default_recency_boost_days(),
            recency_boost_factor: default_recency_boost_factor(),
            importance_weight: default_importance_weight(),
            time_penalty_days: default_time_penalty_days(),
            time_penalty_factor: default_time_penalty_factor(),
        }
    }
}

fn default_vector_weight() -> f32 {
    0.5
}

fn default_bm25_weight() -> f32 {
    0.3
}

fn default_reranker_weight() -> f32 {
    0.2
}

fn default_recency_boost_days() -> f32 {
    7.0
}

fn default_recency_boost_factor() -> f32 {
    0.1
}

fn default_importance_weight() -> f32 {
    0.2
}

fn default_time_penalty_days() -> f32 {
    90.0
}

fn default_time_penalty_factor() -> f32 {
    0.2
}

/// Deduplication strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// Always ask the LLM to decide.
    Llm,
    /// Auto-merge with the top vector candidate, no LLM call.
    Vector,
    /// Skip certain duplicates by vector similarity, otherwise ask the LLM.
    Both,
}

/// Deduplicator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeduplicationConfig {
    /// Decision strategy.
    #[serde(default = "default_dedup_strategy")]
    pub strategy: DedupStrategy,

    /// Similarity at or above which an existing memory is a merge candidate.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// With strategy `both`, similarity at or above which the candidate is
    /// treated as a certain duplicate and skipped without an LLM call.
    #[serde(default = "default_llm_threshold")]
    pub llm_threshold: f32,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            strategy: default_dedup_strategy(),
            similarity_threshold: default_similarity_threshold(),
            llm_threshold: default_llm_threshold(),
        }
    }
}

fn default_dedup_strategy() -> DedupStrategy {
    DedupStrategy::Both
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_llm_threshold() -> f32 {
    0.92
}

/// Extractor gating configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Whether turns are captured automatically by the hook adapters.
    #[serde(default = "default_true")]
    pub auto: bool,

    /// Whether session-end summaries are extracted.
    #[serde(default)]
    pub session_summary: bool,

    /// Whether greeting/acknowledgement turns are filtered out.
    #[serde(default = "default_true")]
    pub noise_filter: bool,

    /// Turns whose combined length is below twice this are skipped.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// User-supplied regexes; a matching user message skips extraction.
    /// Malformed patterns are silently ignored.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            auto: true,
            session_summary: false,
            noise_filter: true,
            min_content_length: default_min_content_length(),
            skip_patterns: Vec::new(),
        }
    }
}

fn default_min_content_length() -> usize {
    20
}
