// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared domain vocabulary used across the Memoir crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::MemoirError;

/// Category of a memory. Controls merge rules during deduplication:
/// `events` and `cases` are append-only and never merge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// Durable facts about who the user is.
    Profile,
    /// Likes, dislikes, and settings.
    Preferences,
    /// People, projects, and tools the user works with.
    Entities,
    /// Things that happened at a point in time.
    Events,
    /// Problem/solution narratives.
    Cases,
    /// Recurring behaviours and habits.
    Patterns,
}

impl MemoryCategory {
    /// The closed category set, in display order.
    pub const ALL: [MemoryCategory; 6] = [
        MemoryCategory::Profile,
        MemoryCategory::Preferences,
        MemoryCategory::Entities,
        MemoryCategory::Events,
        MemoryCategory::Cases,
        MemoryCategory::Patterns,
    ];

    /// Append-only categories never merge; each candidate becomes a new row.
    pub fn is_append_only(self) -> bool {
        matches!(self, MemoryCategory::Events | MemoryCategory::Cases)
    }
}

/// Logical partition key separating memories accessible to different
/// agents, projects, or users.
///
/// String form follows the grammar
/// `global|(agent|project|user|custom):[A-Za-z0-9_.-]+` and is validated on
/// parse. `MemoryScope::parse` is the only constructor from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MemoryScope {
    Global,
    Agent(String),
    Project(String),
    User(String),
    Custom(String),
}

impl MemoryScope {
    /// Parses and validates a scope string against the scope grammar.
    pub fn parse(s: &str) -> Result<Self, MemoirError> {
        if s == "global" {
            return Ok(MemoryScope::Global);
        }
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            MemoirError::InvalidArgument(format!("invalid scope `{s}`: expected `global` or `<kind>:<id>`"))
        })?;
        if !is_valid_scope_part(id) {
            return Err(MemoirError::InvalidArgument(format!(
                "invalid scope `{s}`: id must be non-empty and match [A-Za-z0-9_.-]+"
            )));
        }
        match kind {
            "agent" => Ok(MemoryScope::Agent(id.to_string())),
            "project" => Ok(MemoryScope::Project(id.to_string())),
            "user" => Ok(MemoryScope::User(id.to_string())),
            "custom" => Ok(MemoryScope::Custom(id.to_string())),
            other => Err(MemoirError::InvalidArgument(format!(
                "invalid scope kind `{other}`: expected agent, project, user, or custom"
            ))),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryScope::Global => write!(f, "global"),
            MemoryScope::Agent(id) => write!(f, "agent:{id}"),
            MemoryScope::Project(id) => write!(f, "project:{id}"),
            MemoryScope::User(id) => write!(f, "user:{id}"),
            MemoryScope::Custom(id) => write!(f, "custom:{id}"),
        }
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = MemoirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoryScope::parse(s)
    }
}

impl TryFrom<String> for MemoryScope {
    type Error = MemoirError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        MemoryScope::parse(&s)
    }
}

impl From<MemoryScope> for String {
    fn from(scope: MemoryScope) -> Self {
        scope.to_string()
    }
}

/// Grammar for the id/name part of a non-global scope.
fn is_valid_scope_part(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A single message exchanged with the LLM capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One entry returned by the rerank capability. `index` refers back into
/// the document array handed to `rerank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResult {
    pub index: usize,
    pub score: f32,
}

/// Current time as a unix-millisecond timestamp.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_string_roundtrip() {
        for cat in MemoryCategory::ALL {
            let s = cat.to_string();
            let parsed: MemoryCategory = s.parse().unwrap();
            assert_eq!(parsed, cat);
        }
        assert_eq!(MemoryCategory::Profile.to_string(), "profile");
        assert!("observations".parse::<MemoryCategory>().is_err());
    }

    #[test]
    fn category_append_only() {
        assert!(MemoryCategory::Events.is_append_only());
        assert!(MemoryCategory::Cases.is_append_only());
        assert!(!MemoryCategory::Profile.is_append_only());
        assert!(!MemoryCategory::Preferences.is_append_only());
    }

    #[test]
    fn scope_parse_valid() {
        assert_eq!(MemoryScope::parse("global").unwrap(), MemoryScope::Global);
        assert_eq!(
            MemoryScope::parse("agent:claude-1").unwrap(),
            MemoryScope::Agent("claude-1".to_string())
        );
        assert_eq!(
            MemoryScope::parse("project:my_app.v2").unwrap(),
            MemoryScope::Project("my_app.v2".to_string())
        );
        assert_eq!(
            MemoryScope::parse("user:u-42").unwrap(),
            MemoryScope::User("u-42".to_string())
        );
        assert_eq!(
            MemoryScope::parse("custom:team.alpha").unwrap(),
            MemoryScope::Custom("team.alpha".to_string())
        );
    }

    #[test]
    fn scope_parse_invalid() {
        for s in [
            "",
            "Global",
            "agent:",
            "agent",
            "tenant:abc",
            "user:has space",
            "user:semi;colon",
            "custom:quote'quote",
            "global:extra",
        ] {
            let err = MemoryScope::parse(s).unwrap_err();
            assert!(err.is_invalid_argument(), "`{s}` should fail validation");
        }
    }

    #[test]
    fn scope_display_roundtrip() {
        for s in ["global", "agent:a1", "project:p.2", "user:bob", "custom:x_y"] {
            assert_eq!(MemoryScope::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn scope_serde_as_string() {
        let scope = MemoryScope::parse("agent:a1").unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, "\"agent:a1\"");
        let back: MemoryScope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope);

        let bad: Result<MemoryScope, _> = serde_json::from_str("\"nope:;\"");
        assert!(bad.is_err());
    }

    #[test]
    fn chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }
}
