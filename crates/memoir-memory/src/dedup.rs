// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Near-duplicate elimination for incoming memory candidates.
//!
//! For each candidate the deduplicator decides CREATE, MERGE (with a target
//! and merged text/tags), or SKIP, using a category rule, a vector
//! pre-filter, and optionally an LLM call. Any LLM or parse failure falls
//! back to CREATE: information is never silently lost.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use memoir_config::{DedupStrategy, DeduplicationConfig};
use memoir_core::{ChatMessage, LlmCapability, MemoirError, MemoryScope};

use crate::store::MemoryStore;
use crate::types::{truncate_chars, ExtractedMemory, Memory};

/// At most this many existing memories are considered per candidate.
const MAX_SIMILAR: usize = 5;

/// The vector pre-filter fetches slightly below the decision threshold so
/// borderline rows survive the over-fetch truncation.
const PREFILTER_SLACK: f32 = 0.1;

/// Merged summaries are capped so repeated merges cannot grow a row
/// without bound.
const MERGE_SUMMARY_CAP: usize = 2_000;
/// Cap for merged narrative content.
const MERGE_CONTENT_CAP: usize = 8_000;

/// Decision contract handed to the LLM.
const DEDUP_SYSTEM_PROMPT: &str = r#"You maintain a long-term memory store and decide what to do with a new candidate memory given similar existing memories.

Respond with one JSON object:
- {"action": "create"} when the candidate is genuinely new information
- {"action": "skip"} when an existing memory already covers it completely
- {"action": "merge", "target_id": "<id of the existing memory>", "headline": "...", "summary": "...", "content": "...", "tags": [...]} when the candidate refines or extends an existing memory; the merged fields must preserve all information from both

Prefer create over skip when in doubt: losing information is worse than a near-duplicate. Respond with the JSON object only."#;

/// Outcome of a dedup decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    /// Insert the candidate as a new row.
    Create,
    /// Rewrite the target row with the merged text and tags.
    Merge {
        target_id: String,
        headline: String,
        summary: String,
        content: String,
        tags: Vec<String>,
    },
    /// Discard the candidate as a certain duplicate.
    Skip,
}

/// Decides CREATE / MERGE / SKIP for extracted candidates.
pub struct Deduplicator {
    store: Arc<MemoryStore>,
    llm: Arc<dyn LlmCapability>,
    config: DeduplicationConfig,
}

impl Deduplicator {
    pub fn new(
        store: Arc<MemoryStore>,
        llm: Arc<dyn LlmCapability>,
        config: DeduplicationConfig,
    ) -> Self {
        Self { store, llm, config }
    }

    /// Decides what to do with one embedded candidate.
    ///
    /// Append-only categories short-circuit to CREATE. Otherwise up to
    /// five same-category, same-scope memories are fetched by vector
    /// similarity and the configured strategy decides.
    pub async fn decide(
        &self,
        candidate: &ExtractedMemory,
        scope: &MemoryScope,
        vector: &[f32],
    ) -> Result<DedupDecision, MemoirError> {
        if candidate.category.is_append_only() {
            return Ok(DedupDecision::Create);
        }

        let fetched = self
            .store
            .vector_search(
                vector,
                MAX_SIMILAR,
                Some(scope),
                Some(std::slice::from_ref(&candidate.category)),
                Some(self.config.similarity_threshold - PREFILTER_SLACK),
            )
            .await?;

        let similar: Vec<(Memory, f32)> = fetched
            .into_iter()
            .map(|(memory, distance)| (memory, 1.0 - distance))
            .filter(|(_, similarity)| *similarity >= self.config.similarity_threshold)
            .collect();

        self.decide_with_similar(candidate, &similar).await
    }

    async fn decide_with_similar(
        &self,
        candidate: &ExtractedMemory,
        similar: &[(Memory, f32)],
    ) -> Result<DedupDecision, MemoirError> {
        let Some((top, top_similarity)) = similar.first() else {
            return Ok(DedupDecision::Create);
        };

        match self.config.strategy {
            DedupStrategy::Vector => Ok(auto_merge(top, candidate)),
            DedupStrategy::Both => {
                if *top_similarity >= self.config.llm_threshold {
                    debug!(
                        target_id = %top.id,
                        similarity = top_similarity,
                        "skipping certain duplicate"
                    );
                    Ok(DedupDecision::Skip)
                } else {
                    Ok(self.llm_decide(candidate, similar).await)
                }
            }
            DedupStrategy::Llm => Ok(self.llm_decide(candidate, similar).await),
        }
    }

    /// Asks the LLM to decide. Never fails: transport and parse errors fall
    /// back to CREATE.
    async fn llm_decide(
        &self,
        candidate: &ExtractedMemory,
        similar: &[(Memory, f32)],
    ) -> DedupDecision {
        let mut prompt = String::from("Candidate memory:\n");
        prompt.push_str(
            &json!({
                "headline": candidate.headline,
                "summary": candidate.summary,
                "content": candidate.content,
                "tags": candidate.tags,
            })
            .to_string(),
        );
        prompt.push_str("\n\nSimilar existing memories:\n");
        for (memory, similarity) in similar {
            prompt.push_str(
                &json!({
                    "id": memory.id,
                    "headline": memory.headline,
                    "summary": memory.summary,
                    "tags": memory.tags,
                    "similarity": similarity,
                })
                .to_string(),
            );
            prompt.push('\n');
        }

        let messages = [
            ChatMessage::system(DEDUP_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let response = match self.llm.complete(&messages, true).await {
            Ok(response) => response,
            Err(e) => {
                warn!("dedup LLM call failed, creating: {e}");
                return DedupDecision::Create;
            }
        };

        match parse_decision(&response, candidate, similar) {
            Some(decision) => decision,
            None => {
                warn!("unparseable dedup decision, creating");
                DedupDecision::Create
            }
        }
    }
}

/// Mechanically merged fields: keep the new headline, append summary and
/// content (capped), union the tags with stable order.
fn merged_fields(
    target: &Memory,
    candidate: &ExtractedMemory,
) -> (String, String, String, Vec<String>) {
    (
        candidate.headline.clone(),
        truncate_chars(
            &format!("{}\n{}", target.summary, candidate.summary),
            MERGE_SUMMARY_CAP,
        )
        .to_string(),
        truncate_chars(
            &format!("{}\n{}", target.content, candidate.content),
            MERGE_CONTENT_CAP,
        )
        .to_string(),
        union_tags(&target.tags, &candidate.tags),
    )
}

/// Vector-strategy merge with the top candidate.
fn auto_merge(target: &Memory, candidate: &ExtractedMemory) -> DedupDecision {
    let (headline, summary, content, tags) = merged_fields(target, candidate);
    DedupDecision::Merge {
        target_id: target.id.clone(),
        headline,
        summary,
        content,
        tags,
    }
}

/// Stable-order union: the target's tags first, new entries appended.
fn union_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut out: Vec<String> = existing.to_vec();
    for tag in incoming {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

/// Parses the LLM's decision. Returns `None` for anything that does not
/// validate, including a merge target outside the similar set.
fn parse_decision(
    response: &str,
    candidate: &ExtractedMemory,
    similar: &[(Memory, f32)],
) -> Option<DedupDecision> {
    let value: Value = serde_json::from_str(strip_fences(response.trim())).ok()?;
    let obj = value.as_object()?;
    let action = obj.get("action")?.as_str()?.to_lowercase();

    match action.as_str() {
        "create" => Some(DedupDecision::Create),
        "skip" => Some(DedupDecision::Skip),
        "merge" => {
            let target_id = obj.get("target_id")?.as_str()?;
            let (target, _) = similar.iter().find(|(m, _)| m.id == target_id)?;

            // Missing merged fields fall back to the mechanical merge.
            let (auto_headline, auto_summary, auto_content, auto_tags) =
                merged_fields(target, candidate);

            let field = |key: &str, fallback: String| -> String {
                obj.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or(fallback)
            };

            let tags = obj
                .get("tags")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str())
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .filter(|tags| !tags.is_empty())
                .unwrap_or(auto_tags);

            Some(DedupDecision::Merge {
                target_id: target.id.clone(),
                headline: field("headline", auto_headline),
                summary: field("summary", auto_summary),
                content: field("content", auto_content),
                tags,
            })
        }
        _ => None,
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
