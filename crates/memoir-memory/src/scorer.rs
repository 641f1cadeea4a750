// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-signal scoring for retrieval candidates.
//!
//! Combines vector similarity, normalised lexical score, optional rerank
//! score, recency boost, importance boost, and a multiplicative time-decay
//! penalty into one ranked order. The penalty is multiplicative on an
//! additive base so old memories decay smoothly without ever going negative,
//! while the additive recency boost cannot dominate a very-low-similarity
//! hit.
//!
//! Everything here is pure and non-suspending.

use memoir_config::ScoringConfig;

use crate::types::{Memory, ScoredMemory};

const MS_PER_DAY: f32 = 86_400_000.0;

/// A merged retrieval candidate before scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub memory: Memory,
    /// Vector similarity in [0, 1] (= 1 - cosine distance); 0 when the
    /// candidate only surfaced lexically.
    pub vector_score: f32,
    /// Raw provider-scale lexical score; 0 when the candidate only
    /// surfaced by vector.
    pub bm25_raw: f32,
    /// Raw provider-scale rerank score, when a reranker ran.
    pub rerank_raw: Option<f32>,
}

/// Scores and ranks a merged candidate set.
///
/// Ordering is by descending final score; ties broken by descending
/// importance, then ascending id.
pub fn score_candidates(
    candidates: Vec<Candidate>,
    scoring: &ScoringConfig,
    now_ms: i64,
) -> Vec<ScoredMemory> {
    if candidates.is_empty() {
        return Vec::new();
    }

    // Lexical scores are rescaled by the maximum observed score of the
    // current result set.
    let bm25_max = candidates
        .iter()
        .map(|c| c.bm25_raw)
        .fold(0.0_f32, f32::max);

    // Rerank scores are min-max rescaled across the batch; if all scores
    // are equal the raw score passes through unchanged.
    let rerank_values: Vec<f32> = candidates.iter().filter_map(|c| c.rerank_raw).collect();
    let rerank_bounds = if rerank_values.is_empty() {
        None
    } else {
        let min = rerank_values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = rerank_values
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        Some((min, max))
    };

    let (w_v, w_b, w_r) = effective_weights(scoring, rerank_bounds.is_some());

    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .map(|c| {
            let bm25_norm = if bm25_max > 0.0 {
                c.bm25_raw / bm25_max
            } else {
                0.0
            };
            let rerank_norm = c.rerank_raw.map(|raw| match rerank_bounds {
                Some((min, max)) if max > min => (raw - min) / (max - min),
                _ => raw,
            });

            let base = w_v * c.vector_score
                + w_b * bm25_norm
                + w_r * rerank_norm.unwrap_or(0.0);
            let recency = recency_boost(&c.memory, scoring, now_ms);
            let importance_boost = c.memory.importance * scoring.importance_weight;
            let penalty = time_penalty(&c.memory, scoring, now_ms);

            let final_score =
                ((base + recency + importance_boost) * (1.0 - penalty)).clamp(0.0, 1.0);

            ScoredMemory {
                memory: c.memory,
                score: final_score,
                vector_score: c.vector_score,
                bm25_score: bm25_norm,
                rerank_score: rerank_norm,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.memory
                    .importance
                    .partial_cmp(&a.memory.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    scored
}

/// Signal weights after accounting for rerank availability.
///
/// When no rerank scores are present, the rerank weight is dropped and the
/// vector/lexical weights are renormalised in proportion, falling back to
/// (0.5, 0.5) when both are zero.
fn effective_weights(scoring: &ScoringConfig, has_rerank: bool) -> (f32, f32, f32) {
    if has_rerank {
        return (
            scoring.vector_weight,
            scoring.bm25_weight,
            scoring.reranker_weight,
        );
    }
    let sum = scoring.vector_weight + scoring.bm25_weight;
    if sum > 0.0 {
        (
            scoring.vector_weight / sum,
            scoring.bm25_weight / sum,
            0.0,
        )
    } else {
        (0.5, 0.5, 0.0)
    }
}

/// Linear decay from `recency_boost_factor` to zero over
/// `recency_boost_days`, keyed on the last access (or last mutation when
/// the memory was never recalled).
fn recency_boost(memory: &Memory, scoring: &ScoringConfig, now_ms: i64) -> f32 {
    let reference = memory.last_accessed_at.unwrap_or(memory.updated_at);
    let days = age_days(now_ms, reference);
    if days >= scoring.recency_boost_days {
        0.0
    } else {
        scoring.recency_boost_factor * (1.0 - days / scoring.recency_boost_days)
    }
}

/// Exponential penalty starting after `time_penalty_days`, saturating at
/// `time_penalty_factor` with a 90-day time constant.
fn time_penalty(memory: &Memory, scoring: &ScoringConfig, now_ms: i64) -> f32 {
    let days = age_days(now_ms, memory.created_at);
    if days <= scoring.time_penalty_days {
        0.0
    } else {
        let ramp = 1.0 - (-(days - scoring.time_penalty_days) / 90.0).exp();
        scoring.time_penalty_factor.min(scoring.time_penalty_factor * ramp)
    }
}

fn age_days(now_ms: i64, then_ms: i64) -> f32 {
    ((now_ms - then_ms).max(0)) as f32 / MS_PER_DAY
}
