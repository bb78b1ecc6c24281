use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Uniform JSON envelope: `data` is set when `success` is true, `error` otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock milliseconds spent in the upstream call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration: None,
            credits_used: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            duration: None,
            credits_used: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_credits(mut self, credits: Option<u64>) -> Self {
        self.credits_used = credits;
        self
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Error reply with the given status and a plain message.
pub fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    ApiResponse::<()>::error(message).into_response_with(status)
}

pub fn unauthorized() -> Response {
    failure(StatusCode::UNAUTHORIZED, "unauthorized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_omits_error() {
        let body = serde_json::to_value(
            ApiResponse::ok(json!({"markdown": "# Hi"}))
                .with_duration(12)
                .with_credits(Some(1)),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({"success": true, "data": {"markdown": "# Hi"}, "duration": 12, "creditsUsed": 1})
        );
    }

    #[test]
    fn failure_envelope_omits_data() {
        let body =
            serde_json::to_value(ApiResponse::<()>::error("boom").with_duration(5)).unwrap();
        assert_eq!(body, json!({"success": false, "error": "boom", "duration": 5}));
    }
}
