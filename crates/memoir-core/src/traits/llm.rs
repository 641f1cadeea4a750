// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM capability trait for completion requests.

use async_trait::async_trait;

use crate::error::MemoirError;
use crate::types::ChatMessage;

/// Capability for LLM completions used by extraction and deduplication.
///
/// When `json_mode` is set the implementation asks the provider for JSON
/// output; callers still parse the returned text defensively.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    /// Sends a completion request and returns the response text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        json_mode: bool,
    ) -> Result<String, MemoirError>;
}
