// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Memoir memory engine.

use thiserror::Error;

/// The primary error type used across the capability traits and the engine.
///
/// Ordinary miss cases (unknown id, empty extraction, similarity below
/// threshold) are expressed as `Option`/`bool`/counts, never as errors.
/// Library operations fail only with `InvalidArgument` or an uncaught
/// `Store` error; everything else is recovered internally.
#[derive(Debug, Error)]
pub enum MemoirError {
    /// A scope, id, category, or vector failed whitelist validation before
    /// any engine call was issued. Callers must fix their inputs.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors (out-of-range weights, missing dimensions,
    /// malformed scopes).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage engine errors during insert/update/delete/query.
    #[error("storage error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport or provider error from an embedding, LLM, or rerank
    /// capability.
    #[error("capability error: {message}")]
    Capability {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external payload (LLM output, import file) could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl MemoirError {
    /// Shorthand for a `Store` error without an underlying source.
    pub fn store(message: impl Into<String>) -> Self {
        MemoirError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a `Store` error wrapping an engine error.
    pub fn store_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MemoirError::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for a `Capability` error without an underlying source.
    pub fn capability(message: impl Into<String>) -> Self {
        MemoirError::Capability {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a `Capability` error wrapping a transport error.
    pub fn capability_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MemoirError::Capability {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True when this error is a pre-engine validation failure.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, MemoirError::InvalidArgument(_))
    }
}
