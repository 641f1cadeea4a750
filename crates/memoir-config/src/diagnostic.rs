// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.

use thiserror::Error;

/// A single configuration problem found during validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A semantic constraint was violated (out-of-range value, malformed
    /// scope, empty path).
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}
