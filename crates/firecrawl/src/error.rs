use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirecrawlError {
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("upstream returned {status}: {message}")]
    HttpStatus { status: StatusCode, message: String },
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("{job} job {status}: {message}")]
    JobFailed {
        job: &'static str,
        status: String,
        message: String,
    },
    #[error("upstream timeout after {}s", limit.as_secs())]
    Timeout { limit: Duration },
    #[error("failed to decode upstream payload: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

impl FirecrawlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Turn an upstream error body into a readable message.
///
/// A string `error` field is used verbatim, a structured `error` (or
/// `details`) object is serialized as compact JSON, anything else falls back
/// to the raw body text.
pub fn describe_failure(body: &str) -> String {
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => describe_value(&value).unwrap_or_else(|| trimmed.to_string()),
        Err(_) if trimmed.is_empty() => "<empty body>".to_string(),
        Err(_) => trimmed.to_string(),
    }
}

pub(crate) fn describe_value(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    for key in ["error", "details", "message"] {
        match object.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => return Some(text.clone()),
            Some(Value::Null) | None => continue,
            Some(Value::String(_)) => continue,
            Some(other) => return Some(other.to_string()),
        }
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_error_field_is_used_verbatim() {
        assert_eq!(
            describe_failure(r#"{"success":false,"error":"Payment required"}"#),
            "Payment required"
        );
    }

    #[test]
    fn structured_error_is_serialized_not_dropped() {
        let message = describe_failure(r#"{"error":{"code":"RATE_LIMIT","retryAfter":30}}"#);
        assert!(message.contains("RATE_LIMIT"));
        assert!(message.contains("retryAfter"));
    }

    #[test]
    fn non_json_body_is_passed_through() {
        assert_eq!(describe_failure("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(describe_failure("   "), "<empty body>");
    }

    #[test]
    fn timeout_message_mentions_timeout() {
        let err = FirecrawlError::Timeout {
            limit: Duration::from_secs(300),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "upstream timeout after 300s");
    }
}
