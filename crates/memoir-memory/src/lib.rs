// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory engine for conversational assistants.
//!
//! Ingests (user, assistant) dialogue turns, distils them into durable,
//! categorised memory records with three abstraction levels, eliminates
//! near-duplicates, and retrieves the most relevant memories for a query
//! via a hybrid vector + lexical pipeline with optional cross-encoder
//! rerank and multi-signal scoring.
//!
//! ## Architecture
//!
//! - **MemoryStore**: LanceDB persistence with ANN and full-text indices
//! - **PredicateBuilder**: validate -> escape -> compose filter strings
//! - **WriteQueue**: FIFO serialisation of all store mutations
//! - **Scorer**: vector + BM25 + rerank + recency/importance/time-decay
//! - **Retriever**: the hybrid retrieval pipeline
//! - **Extractor**: LLM-based distillation of turns into candidates
//! - **Deduplicator**: CREATE / MERGE / SKIP decisions
//! - **MemoryManager**: public façade with an explicit open/close lifecycle
//! - **HttpEmbedder / HttpLlm / HttpReranker**: default capability clients

pub mod context;
pub mod dedup;
pub mod embedder;
pub mod extractor;
mod http;
pub mod llm;
pub mod manager;
pub mod noise;
pub mod predicate;
pub mod reranker;
pub mod retriever;
pub mod scorer;
pub mod store;
#[cfg(test)]
pub(crate) mod testutil;
pub mod types;
mod writer;

pub use context::{build_context_block, neutralize_markup};
pub use dedup::{DedupDecision, Deduplicator};
pub use embedder::HttpEmbedder;
pub use extractor::Extractor;
pub use llm::HttpLlm;
pub use manager::MemoryManager;
pub use predicate::PredicateBuilder;
pub use reranker::HttpReranker;
pub use retriever::Retriever;
pub use store::MemoryStore;
pub use types::{
    ContextLevel, ExportPayload, ExtractedMemory, ListFilter, Memory, MemoryDelta, MemoryStats,
    OrderBy, OrderDir, RecallOptions, RetrievalResult, ScoredMemory, StoreOptions,
};
