// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared plumbing for the HTTP capability clients: authenticated client
//! construction, JSON POST with a single retry on transient status codes,
//! and typed error mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use memoir_core::MemoirError;

/// One retry after a 1-second pause, as for all capability transports.
pub(crate) const MAX_RETRIES: u32 = 1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Builds a pooled client with bearer auth (when a key is configured).
pub(crate) fn build_client(api_key: Option<&str>) -> Result<reqwest::Client, MemoirError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = api_key {
        let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            MemoirError::Config(format!("invalid API key header value: {e}"))
        })?;
        headers.insert("authorization", value);
    }
    headers.insert("content-type", HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| MemoirError::capability_with("failed to build HTTP client", e))
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// POSTs a JSON body and parses the JSON response.
///
/// On transient status (429, 500, 503) the request is retried once after a
/// 1-second delay; all other failures map to `Capability` errors.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
    what: &str,
) -> Result<Value, MemoirError> {
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            warn!(attempt, what, "retrying after transient error");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let response = client.post(url).json(body).send().await.map_err(|e| {
            MemoirError::capability_with(format!("{what} request failed"), e)
        })?;

        let status = response.status();
        debug!(status = %status, attempt, what, "response received");

        if status.is_success() {
            let text = response.text().await.map_err(|e| {
                MemoirError::capability_with(format!("{what}: failed to read response body"), e)
            })?;
            return serde_json::from_str(&text).map_err(|e| {
                MemoirError::capability_with(format!("{what}: malformed JSON response"), e)
            });
        }

        let text = response.text().await.unwrap_or_default();
        if is_transient_error(status) && attempt < MAX_RETRIES {
            warn!(status = %status, what, "transient error, will retry");
            last_error = Some(MemoirError::capability(format!(
                "{what}: provider returned {status}: {text}"
            )));
            continue;
        }

        return Err(MemoirError::capability(format!(
            "{what}: provider returned {status}: {text}"
        )));
    }

    Err(last_error
        .unwrap_or_else(|| MemoirError::capability(format!("{what}: failed after retries"))))
}

fn is_transient_error(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
    )
}
