//! Error mapping for downstream HTTP responses
//!
//! Converts raw HTTP status codes and bodies into the normalized
//! `ServiceError::Upstream` shape and classifies them for the retry layer.

use reqwest::StatusCode;
use serde_json::Value;

use super::ServiceError;

/// Canonical reason phrase for a status code, or an empty string
pub fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

/// Parse a response body as JSON, keeping non-JSON bodies as a string value
pub fn parse_body(body: &str) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Map a downstream response to an upstream error
pub fn map_http_error(status: StatusCode, body: &str) -> ServiceError {
    let status_text = status.canonical_reason().unwrap_or_default();
    ServiceError::upstream(status.as_u16(), status_text, parse_body(body))
}

/// Consume a failed response into an upstream error
pub async fn parse_error_response(response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("Failed to read error response: {}", e),
    };
    map_http_error(status, &body)
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_error(status: u16) -> &'static str {
    match status {
        400 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 => "timeout",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}

/// Determine if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}
