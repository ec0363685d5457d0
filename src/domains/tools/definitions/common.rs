//! Common utilities shared across tool definitions.

use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::domains::tools::ToolError;

/// Longest upstream error body echoed back to the caller.
const MAX_ERROR_BODY: usize = 500;

/// Turn an arbitrary title into a safe file name.
///
/// Characters that are invalid on common filesystems become `_`, runs of
/// `_` collapse, and the result is trimmed. Empty input yields `untitled`.
pub fn safe_filename(name: &str) -> String {
    let mut safe = String::with_capacity(name.len());
    for c in name.chars() {
        let c = match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if c == '_' && safe.ends_with('_') {
            continue;
        }
        safe.push(c);
    }

    let trimmed = safe.trim_matches(|c| c == '_' || c == ' ');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Truncate `text` to at most `max` characters, appending an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Build the shared HTTP client used by an integration.
pub fn http_client(
    timeout: Duration,
    headers: reqwest::header::HeaderMap,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("research-gateway/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()
}

/// Decode a JSON response, turning non-2xx statuses into upstream failures
/// that carry the API's own error text.
pub async fn json_response<T: DeserializeOwned>(
    service: &str,
    response: Response,
) -> Result<T, ToolError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = upstream_message(&body).unwrap_or_else(|| truncate(body.trim(), MAX_ERROR_BODY));
        warn!("{} API error {}: {}", service, status, detail);
        return Err(ToolError::upstream(format!(
            "{} API error {}: {}",
            service, status, detail
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ToolError::upstream(format!("Failed to parse {} response: {}", service, e)))
}

/// Pull the human-readable message out of common JSON error bodies.
fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| value.pointer("/error/message").and_then(|m| m.as_str()))
        .or_else(|| value.get("error").and_then(|m| m.as_str()))
        .map(str::to_string)
}
