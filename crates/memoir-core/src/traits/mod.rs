// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits implemented by pluggable embedding, LLM, and rerank
//! providers.

pub mod embedding;
pub mod llm;
pub mod rerank;

pub use embedding::EmbeddingCapability;
pub use llm::LlmCapability;
pub use rerank::RerankCapability;
