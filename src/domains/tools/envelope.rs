//! The response envelope every tool call is normalized into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suggestion attached to failures raised inside a matched tool.
pub const DEFAULT_SUGGESTION: &str = "Check the parameters and try again";

/// Uniform JSON shape for every dispatch outcome.
///
/// Serializes as `{"status": "success", "data": ..., "message"?: ...}` or
/// `{"status": "error", "error": ..., "tool"?: ..., "suggestion"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseEnvelope {
    Success {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },
}

impl ResponseEnvelope {
    /// Wrap a successful result.
    pub fn success(data: Value) -> Self {
        Self::Success {
            data,
            message: None,
        }
    }

    /// Wrap a successful result together with a human-readable message.
    pub fn success_with_message(data: Value, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Success {
            data,
            message: (!message.is_empty()).then_some(message),
        }
    }

    /// Bare error with no originating tool, used for unknown tools and
    /// unavailable integrations.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            tool: None,
            suggestion: None,
        }
    }

    /// Error raised while invoking a matched tool.
    pub fn failure(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            tool: Some(tool.into()),
            suggestion: Some(DEFAULT_SUGGESTION.to_string()),
        }
    }

    /// `{"status":"error","error":"Unknown tool: <name>"}`
    pub fn unknown_tool(name: &str) -> Self {
        Self::error(format!("Unknown tool: {}", name))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The error message, if this is an error envelope.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    /// Serialize as indented JSON text, the form returned to clients.
    pub fn to_pretty_json(&self) -> String {
        // Serializing a tagged enum of strings and JSON values cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(
                "{{\n  \"status\": \"error\",\n  \"error\": \"failed to serialize response: {}\"\n}}",
                e
            )
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let envelope = ResponseEnvelope::success(json!(["a.txt", "b.txt"]));
        assert_eq!(
            envelope.to_value(),
            json!({"status": "success", "data": ["a.txt", "b.txt"]})
        );
    }

    #[test]
    fn test_success_with_message_shape() {
        let envelope = ResponseEnvelope::success_with_message(json!(1), "done");
        assert_eq!(
            envelope.to_value(),
            json!({"status": "success", "data": 1, "message": "done"})
        );

        let envelope = ResponseEnvelope::success_with_message(json!(1), "");
        assert_eq!(envelope.to_value(), json!({"status": "success", "data": 1}));
    }

    #[test]
    fn test_unknown_tool_shape() {
        let envelope = ResponseEnvelope::unknown_tool("nope");
        assert_eq!(
            envelope.to_value(),
            json!({"status": "error", "error": "Unknown tool: nope"})
        );
    }

    #[test]
    fn test_failure_shape() {
        let envelope = ResponseEnvelope::failure("read_dropbox_file", "boom");
        assert_eq!(
            envelope.to_value(),
            json!({
                "status": "error",
                "error": "boom",
                "tool": "read_dropbox_file",
                "suggestion": "Check the parameters and try again"
            })
        );
        assert!(!envelope.is_success());
        assert_eq!(envelope.error_message(), Some("boom"));
    }

    #[test]
    fn test_pretty_json_is_indented() {
        let text = ResponseEnvelope::success(json!({"k": "v"})).to_pretty_json();
        assert!(text.contains("\n  \"status\": \"success\""));
        let parsed: ResponseEnvelope = serde_json::from_str(&text).unwrap();
        assert!(parsed.is_success());
    }
}
