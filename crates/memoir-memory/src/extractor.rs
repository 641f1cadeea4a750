// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based memory extraction from dialogue turns, sessions, and free text.
//!
//! A single system prompt describes the extraction contract; the returned
//! text is parsed defensively (fence stripping, array-or-object acceptance,
//! per-item validation). Transport or parse failures yield an empty
//! extraction list and the caller proceeds.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use memoir_config::CaptureConfig;
use memoir_core::{ChatMessage, LlmCapability, MemoirError};

use crate::noise::is_noise;
use crate::types::ExtractedMemory;

/// Extraction contract handed to the LLM.
const EXTRACTION_SYSTEM_PROMPT: &str = r#"You distil conversations into durable memories for a personal assistant.

For each fact worth remembering long-term, emit one JSON object with:
- "headline": the fact in at most 15 words
- "summary": the fact in 2-4 sentences with its immediate context
- "content": the full narrative, self-contained, readable months later
- "category": exactly one of "profile" (who the user is), "preferences" (likes, dislikes, settings), "entities" (people, projects, tools in the user's world), "events" (things that happened at a point in time), "cases" (problem/solution narratives), "patterns" (recurring behaviours)
- "importance": 0.0-1.0 (0.9+: identity-level facts; 0.7-0.9: stable preferences and key entities; 0.4-0.7: useful context; below 0.4: probably not worth storing)
- "tags": 2-5 short lowercase keywords

Only extract facts that are stated or clearly implied, would plausibly matter in a future conversation, and are about the user or their world (not general knowledge). Do not re-emit facts already listed under "Known context".

Respond with a JSON array only. Return [] when nothing is worth remembering."#;

/// How many trailing context messages are shown to the LLM as known facts.
const EXISTING_CONTEXT_MESSAGES: usize = 12;

/// Produces `ExtractedMemory` candidates from conversation text.
pub struct Extractor {
    llm: Arc<dyn LlmCapability>,
    capture: CaptureConfig,
    skip_patterns: Vec<Regex>,
}

impl Extractor {
    /// Builds an extractor. Malformed `skip_patterns` entries are silently
    /// ignored (with a debug log).
    pub fn new(llm: Arc<dyn LlmCapability>, capture: CaptureConfig) -> Self {
        let skip_patterns = capture
            .skip_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!("ignoring malformed skip pattern `{p}`: {e}");
                    None
                }
            })
            .collect();
        Self {
            llm,
            capture,
            skip_patterns,
        }
    }

    /// Extracts candidates from a single (user, assistant) turn.
    ///
    /// The noise gate applies here: greeting/acknowledgement user messages,
    /// turns below twice `min_content_length`, and turns matching a skip
    /// pattern produce an empty extraction without any LLM call.
    pub async fn extract_from_turn(
        &self,
        user_message: &str,
        assistant_response: &str,
        existing_context: &[ChatMessage],
    ) -> Result<Vec<ExtractedMemory>, MemoirError> {
        if self.should_skip_turn(user_message, assistant_response) {
            return Ok(Vec::new());
        }

        let mut prompt = String::new();
        if !existing_context.is_empty() {
            prompt.push_str("Known context (do not re-extract):\n");
            let start = existing_context
                .len()
                .saturating_sub(EXISTING_CONTEXT_MESSAGES);
            for message in &existing_context[start..] {
                prompt.push_str(&format!("{}: {}\n", role_label(&message.role), message.content));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "Conversation turn:\nUser: {user_message}\nAssistant: {assistant_response}"
        ));

        self.run_extraction(&prompt).await
    }

    /// Extracts candidates from a full conversation history.
    pub async fn extract_from_session(
        &self,
        history: &[ChatMessage],
    ) -> Result<Vec<ExtractedMemory>, MemoirError> {
        if history.is_empty() {
            return Ok(Vec::new());
        }
        let mut prompt = String::from("Conversation:\n");
        for message in history {
            prompt.push_str(&format!("{}: {}\n", role_label(&message.role), message.content));
        }
        self.run_extraction(&prompt).await
    }

    /// Extracts candidates from a free-text blob.
    pub async fn extract_from_text(
        &self,
        text: &str,
    ) -> Result<Vec<ExtractedMemory>, MemoirError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let prompt = format!("Text to distil into memories:\n{text}");
        self.run_extraction(&prompt).await
    }

    /// Per-turn capture gate.
    pub fn should_skip_turn(&self, user_message: &str, assistant_response: &str) -> bool {
        if self.capture.noise_filter && is_noise(user_message) {
            return true;
        }
        if user_message.len() + assistant_response.len() < 2 * self.capture.min_content_length {
            return true;
        }
        self.skip_patterns
            .iter()
            .any(|re| re.is_match(user_message))
    }

    async fn run_extraction(&self, prompt: &str) -> Result<Vec<ExtractedMemory>, MemoirError> {
        let messages = [
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let response = match self.llm.complete(&messages, true).await {
            Ok(response) => response,
            Err(e) => {
                warn!("extraction LLM call failed: {e}");
                return Ok(Vec::new());
            }
        };
        Ok(parse_extraction(&response))
    }
}

fn role_label(role: &str) -> &str {
    match role {
        "user" => "User",
        "assistant" => "Assistant",
        "system" => "System",
        other => other,
    }
}

/// Parses the LLM extraction response into validated candidates.
///
/// Strips fenced code-block markers, accepts a top-level array or an object
/// containing one, and silently drops malformed items. Unparseable
/// responses yield an empty list.
pub fn parse_extraction(response: &str) -> Vec<ExtractedMemory> {
    let stripped = strip_code_fences(response.trim());

    let value: Value = match serde_json::from_str(stripped) {
        Ok(value) => value,
        Err(_) => {
            // Salvage the outermost array from surrounding prose.
            match (stripped.find('['), stripped.rfind(']')) {
                (Some(start), Some(end)) if end > start => {
                    match serde_json::from_str(&stripped[start..=end]) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!("unparseable extraction response: {e}");
                            return Vec::new();
                        }
                    }
                }
                _ => {
                    warn!("extraction response contained no JSON array");
                    return Vec::new();
                }
            }
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items.iter().filter_map(ExtractedMemory::from_value).collect()
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the fence line (which may carry a language tag), then the
    // closing fence.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLlm {
        response: String,
        calls: AtomicUsize,
    }

    impl FixedLlm {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmCapability for FixedLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _json_mode: bool,
        ) -> Result<String, MemoirError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmCapability for FailingLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _json_mode: bool,
        ) -> Result<String, MemoirError> {
            Err(MemoirError::capability("provider unreachable"))
        }
    }

    const ONE_FACT: &str = r#"[{
        "headline": "User is a senior TypeScript developer",
        "summary": "The user works as a senior TypeScript developer.",
        "content": "The user mentioned having worked as a senior TypeScript developer for five years.",
        "category": "profile",
        "importance": 0.9,
        "tags": ["typescript", "developer"]
    }]"#;

    fn extractor_with(llm: Arc<dyn LlmCapability>, capture: CaptureConfig) -> Extractor {
        Extractor::new(llm, capture)
    }

    fn long_turn() -> (&'static str, &'static str) {
        (
            "I've been writing TypeScript professionally for five years now.",
            "That's solid experience, especially for large codebases.",
        )
    }

    #[tokio::test]
    async fn extracts_valid_candidates() {
        let llm = Arc::new(FixedLlm::new(ONE_FACT));
        let extractor = extractor_with(llm.clone(), CaptureConfig::default());
        let (user, assistant) = long_turn();
        let extracted = extractor
            .extract_from_turn(user, assistant, &[])
            .await
            .unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].tags, vec!["typescript", "developer"]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn noise_turn_skips_llm_entirely() {
        let llm = Arc::new(FixedLlm::new(ONE_FACT));
        let extractor = extractor_with(llm.clone(), CaptureConfig::default());
        let extracted = extractor
            .extract_from_turn("thanks!", "You're welcome! Anything else I can help with today?", &[])
            .await
            .unwrap();
        assert!(extracted.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_turn_skips_llm() {
        let llm = Arc::new(FixedLlm::new(ONE_FACT));
        let extractor = extractor_with(llm.clone(), CaptureConfig::default());
        let extracted = extractor
            .extract_from_turn("why?", "because", &[])
            .await
            .unwrap();
        assert!(extracted.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_patterns_gate_and_malformed_ones_are_ignored() {
        let llm = Arc::new(FixedLlm::new(ONE_FACT));
        let mut capture = CaptureConfig::default();
        capture.skip_patterns = vec![
            "(unclosed".to_string(),      // malformed: ignored
            "^/[a-z]+".to_string(),       // slash commands
        ];
        let extractor = extractor_with(llm.clone(), capture);
        assert_eq!(extractor.skip_patterns.len(), 1);

        let extracted = extractor
            .extract_from_turn(
                "/compact please run the compaction routine on this thread",
                "Done, the thread has been compacted as requested.",
                &[],
            )
            .await
            .unwrap();
        assert!(extracted.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn llm_failure_yields_empty_extraction() {
        let extractor = extractor_with(Arc::new(FailingLlm), CaptureConfig::default());
        let (user, assistant) = long_turn();
        let extracted = extractor
            .extract_from_turn(user, assistant, &[])
            .await
            .unwrap();
        assert!(extracted.is_empty());
    }

    #[tokio::test]
    async fn session_extraction_formats_history() {
        let llm = Arc::new(FixedLlm::new(ONE_FACT));
        let extractor = extractor_with(llm, CaptureConfig::default());
        let history = vec![
            ChatMessage::user("I prefer tabs over spaces."),
            ChatMessage::assistant("Noted, tabs it is."),
        ];
        let extracted = extractor.extract_from_session(&history).await.unwrap();
        assert_eq!(extracted.len(), 1);

        let empty = extractor.extract_from_session(&[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn parse_plain_array() {
        assert_eq!(parse_extraction(ONE_FACT).len(), 1);
    }

    #[test]
    fn parse_fenced_array() {
        let fenced = format!("```json\n{ONE_FACT}\n```");
        assert_eq!(parse_extraction(&fenced).len(), 1);
        let bare_fence = format!("```\n{ONE_FACT}\n```");
        assert_eq!(parse_extraction(&bare_fence).len(), 1);
    }

    #[test]
    fn parse_object_wrapping_array() {
        let wrapped = format!("{{\"memories\": {ONE_FACT}}}");
        assert_eq!(parse_extraction(&wrapped).len(), 1);
    }

    #[test]
    fn parse_array_with_surrounding_prose() {
        let prose = format!("Here are the extracted facts:\n{ONE_FACT}\nThat is all.");
        assert_eq!(parse_extraction(&prose).len(), 1);
    }

    #[test]
    fn parse_malformed_yields_empty() {
        assert!(parse_extraction("not json at all").is_empty());
        assert!(parse_extraction("").is_empty());
        assert!(parse_extraction("{\"no\": \"array here\"}").is_empty());
    }

    #[test]
    fn parse_drops_invalid_items_keeps_valid() {
        let mixed = r#"[
            {"headline": "ok", "summary": "s", "content": "c", "category": "profile"},
            {"headline": "missing summary", "content": "c", "category": "profile"},
            {"headline": "bad cat", "summary": "s", "content": "c", "category": "rumors"}
        ]"#;
        let extracted = parse_extraction(mixed);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].headline, "ok");
    }

    #[test]
    fn parse_clamps_importance_and_defaults_tags() {
        let item = r#"[{"headline": "h", "summary": "s", "content": "c", "category": "events", "importance": 7}]"#;
        let extracted = parse_extraction(item);
        assert!((extracted[0].importance - 1.0).abs() < f32::EPSILON);
        assert!(extracted[0].tags.is_empty());
        assert!(extracted[0].metadata.is_empty());
    }
}
