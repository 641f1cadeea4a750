// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: value ranges, non-empty paths, and the scope grammar.

use memoir_core::MemoryScope;

use crate::diagnostic::ConfigError;
use crate::model::MemoirConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MemoirConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.db_path.trim().is_empty() {
        errors.push(ConfigError::validation("db_path must not be empty"));
    }

    if let Err(e) = MemoryScope::parse(&config.default_scope) {
        errors.push(ConfigError::validation(format!("default_scope: {e}")));
    }

    if config.embedding.dimensions == 0 {
        errors.push(ConfigError::validation(
            "embedding.dimensions must be greater than zero",
        ));
    }

    if config.retrieval.limit == 0 {
        errors.push(ConfigError::validation("retrieval.limit must be at least 1"));
    }

    if config.retrieval.candidate_multiplier == 0 {
        errors.push(ConfigError::validation(
            "retrieval.candidate_multiplier must be at least 1",
        ));
    }

    check_unit_range(&mut errors, "retrieval.min_score", config.retrieval.min_score);
    check_unit_range(&mut errors, "scoring.vector_weight", config.scoring.vector_weight);
    check_unit_range(&mut errors, "scoring.bm25_weight", config.scoring.bm25_weight);
    check_unit_range(
        &mut errors,
        "scoring.reranker_weight",
        config.scoring.reranker_weight,
    );
    check_unit_range(
        &mut errors,
        "scoring.importance_weight",
        config.scoring.importance_weight,
    );
    check_unit_range(
        &mut errors,
        "scoring.recency_boost_factor",
        config.scoring.recency_boost_factor,
    );
    check_unit_range(
        &mut errors,
        "scoring.time_penalty_factor",
        config.scoring.time_penalty_factor,
    );
    check_unit_range(
        &mut errors,
        "deduplication.similarity_threshold",
        config.deduplication.similarity_threshold,
    );
    check_unit_range(
        &mut errors,
        "deduplication.llm_threshold",
        config.deduplication.llm_threshold,
    );
    check_unit_range(&mut errors, "recall_min_score", config.recall_min_score);

    if config.scoring.recency_boost_days < 0.0 {
        errors.push(ConfigError::validation(format!(
            "scoring.recency_boost_days must be non-negative, got {}",
            config.scoring.recency_boost_days
        )));
    }

    if config.scoring.time_penalty_days < 0.0 {
        errors.push(ConfigError::validation(format!(
            "scoring.time_penalty_days must be non-negative, got {}",
            config.scoring.time_penalty_days
        )));
    }

    if let Some(reranker) = &config.retrieval.reranker {
        if reranker.model.trim().is_empty() {
            errors.push(ConfigError::validation(
                "retrieval.reranker.model must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_unit_range(errors: &mut Vec<ConfigError>, name: &str, value: f32) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::validation(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
}
