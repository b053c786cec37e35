//! Shared error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details, or the bare `{"detail": ...}` body FastAPI-style
/// backends return. Every field is optional so both shapes decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Attempt to parse an error body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    parsed.title.filter(|t| !t.trim().is_empty())
}

/// REST API error for client-side use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Best human-readable message for this error.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { status, body } => {
                try_problem_detail(body).unwrap_or_else(|| format!("HTTP {}", status))
            }
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Http { status: 404, .. })
    }
}

/// Reasons an inbound live-update frame could not be turned into an update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    NotJson(String),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string `type` field")]
    MissingType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastapi_detail_body() {
        assert_eq!(
            try_problem_detail(r#"{"detail":"Work order not found"}"#),
            Some("Work order not found".to_string())
        );
    }

    #[test]
    fn problem_title_fallback() {
        assert_eq!(
            try_problem_detail(r#"{"type":"about:blank","title":"Forbidden","status":403,"detail":"  "}"#),
            Some("Forbidden".to_string())
        );
        assert_eq!(try_problem_detail("not json"), None);
    }

    #[test]
    fn api_error_user_message() {
        let err = ApiError::Http {
            status: 404,
            body: r#"{"detail":"Work order not found"}"#.into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.user_message(), "Work order not found");

        let plain = ApiError::Http {
            status: 502,
            body: "<html>".into(),
        };
        assert_eq!(plain.user_message(), "HTTP 502");
    }
}
