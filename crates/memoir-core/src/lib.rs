// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core error types, domain vocabulary, and capability traits for the
//! Memoir memory engine.
//!
//! This crate carries everything shared between the configuration layer and
//! the engine itself:
//!
//! - **MemoirError**: the single error type used across the workspace
//! - **MemoryCategory / MemoryScope**: the closed category set and the
//!   validated scope grammar
//! - **Capability traits**: `EmbeddingCapability`, `LlmCapability`,
//!   `RerankCapability`

pub mod error;
pub mod traits;
pub mod types;

pub use error::MemoirError;
pub use traits::{EmbeddingCapability, LlmCapability, RerankCapability};
pub use types::{now_ms, ChatMessage, MemoryCategory, MemoryScope, RerankResult};
