//! Shared HTTP plumbing for the platform clients
//!
//! Every client goes through one `reqwest::Client` carrying the configured
//! timeout, and every non-success response is turned into a `PlatformError`
//! whose message is the platform's own text.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::error::PlatformError;

/// Longest raw body echoed back when a response carries no structured message
const MAX_RAW_BODY: usize = 200;

pub fn build_client(timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("affcast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure (no response received)
pub fn send_error(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Network(format!("request timed out: {}", e))
    } else if e.is_connect() {
        PlatformError::Network(format!("connection failed: {}", e))
    } else {
        PlatformError::Network(e.to_string())
    }
}

/// Read a response body as JSON, mapping HTTP and API-level errors
///
/// Graph API endpoints occasionally answer 200 with an `error` object, so the
/// body is checked even on success.
pub async fn read_json(resp: Response) -> Result<Value, PlatformError> {
    let status = resp.status();
    let body = resp.text().await.map_err(send_error)?;

    if !status.is_success() {
        return Err(error_from_response(status, &body));
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        PlatformError::Posting(format!("unexpected response ({}): {}", e, truncate(&body)))
    })?;

    if value.get("error").is_some() {
        return Err(error_from_response(status, &body));
    }

    Ok(value)
}

/// Classify an error response
///
/// Graph API error codes take precedence over the HTTP status because Meta
/// reports throttling and expired tokens with a generic 400.
pub fn error_from_response(status: StatusCode, body: &str) -> PlatformError {
    let json: Option<Value> = serde_json::from_str(body).ok();
    let message = json
        .as_ref()
        .and_then(api_message)
        .unwrap_or_else(|| {
            let raw = truncate(body.trim());
            if raw.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                raw
            }
        });

    let graph_code = json
        .as_ref()
        .and_then(|v| v.pointer("/error/code"))
        .and_then(Value::as_i64);

    match graph_code {
        Some(4 | 17 | 32 | 613) => return PlatformError::RateLimit(message),
        Some(102 | 190) => return PlatformError::Authentication(message),
        _ => {}
    }

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(message),
        400 | 422 => PlatformError::Validation(message),
        429 => PlatformError::RateLimit(message),
        _ => PlatformError::Posting(message),
    }
}

/// The human-readable message of a JSON error body
///
/// Meta: `{"error": {"message": ..}}`. X: `{"detail": ..}` or
/// `{"errors": [{"message": ..}]}` or `{"title": ..}`.
fn api_message(v: &Value) -> Option<String> {
    v.pointer("/error/message")
        .or_else(|| v.get("detail"))
        .or_else(|| v.pointer("/errors/0/message"))
        .or_else(|| v.get("title"))
        .or_else(|| v.get("error").filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_RAW_BODY {
        s.to_string()
    } else {
        let head: String = s.chars().take(MAX_RAW_BODY).collect();
        format!("{}...", head)
    }
}

/// Pull a string id field out of a JSON response
pub fn require_str(value: &Value, pointer: &str) -> Result<String, PlatformError> {
    match value.pointer(pointer) {
        Some(Value::String(s)) => Ok(s.clone()),
        // X and Graph ids are strings, but tolerate bare numbers
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PlatformError::Posting(format!(
            "response is missing '{}'",
            pointer.trim_start_matches('/')
        ))),
    }
}
