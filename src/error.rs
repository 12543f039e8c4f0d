//! # Error Handling
//!
//! Unified error handling for the Ticketboard API, implementing a
//! problem+json response format with a correlation ID for log matching.
//!
//! Upstream Zendesk failures never surface here: the client layer swallows
//! them into empty results by contract. This module only covers errors the
//! HTTP surface itself can produce.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::correlation_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Generate a short correlation ID for basic client-server log matching
    fn correlation_id() -> Option<Box<str>> {
        Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_correlation_id() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "bad input");
        let trace_id = error.trace_id.expect("correlation id set");
        assert!(trace_id.starts_with("corr-"));
    }

    #[test]
    fn serialization_skips_status_and_empty_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "bad input");
        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("details").is_none());
        assert_eq!(json["code"], "VALIDATION_FAILED");
    }

    #[test]
    fn validation_error_includes_details() {
        let error = validation_error(
            "minutes_back out of range",
            serde_json::json!({ "minutes_back": "must be between 1 and 1440" }),
        );
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.details.is_some());
    }
}
