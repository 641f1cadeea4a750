// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model and validation for the Memoir memory engine.
//!
//! The engine consumes a validated [`MemoirConfig`] object. Reading the
//! config file and applying environment-variable overrides is the host
//! process's job; this crate only defines the shape, defaults, and semantic
//! validation of the object itself.

pub mod diagnostic;
pub mod model;
pub mod validation;

pub use diagnostic::ConfigError;
pub use model::{
    CaptureConfig, DedupStrategy, DeduplicationConfig, EmbeddingConfig, LlmConfig, MemoirConfig,
    RerankerConfig, RetrievalConfig, ScoringConfig,
};
pub use validation::validate_config;
