use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked: {0}")]
    AccountLocked(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the backend (`{"error": ...}` or `{"message": ...}`)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human readable message out of an error body, falling back to the raw text
    fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error: Some(msg), .. }) | Ok(ErrorBody { message: Some(msg), .. }) => {
                Self::truncate_body(&msg)
            }
            _ => Self::truncate_body(body.trim()),
        }
    }

    /// Map a non-success status from an authenticated call to an error.
    ///
    /// 401 is mapped to `SessionExpired`; callers that can recover from it
    /// (the session manager) intercept the status before getting here.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body);
        match status.as_u16() {
            401 => ApiError::SessionExpired,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            423 => ApiError::AccountLocked(message),
            429 => ApiError::RateLimited,
            400..=499 => ApiError::Validation(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Map a non-success status from the login endpoint
    pub fn from_login_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::InvalidCredentials,
            _ => Self::from_status(status, body),
        }
    }

    /// True for failures that mean the local session is gone
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::SessionExpired));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "nope"), ApiError::Forbidden(_)));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::CONFLICT, ""), ApiError::Validation(_)));
    }

    #[test]
    fn test_validation_message_extracted_from_body() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"error":"serialNumber contains invalid characters"}"#);
        match err {
            ApiError::Validation(msg) => assert_eq!(msg, "serialNumber contains invalid characters"),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message":"bad date"}"#);
        assert_eq!(err.to_string(), "Request rejected: bad date");

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, "plain text");
        assert_eq!(err.to_string(), "Request rejected: plain text");
    }

    #[test]
    fn test_login_status_mapping() {
        assert!(matches!(
            ApiError::from_login_status(StatusCode::UNAUTHORIZED, r#"{"error":"Invalid credentials"}"#),
            ApiError::InvalidCredentials
        ));
        match ApiError::from_login_status(StatusCode::LOCKED, r#"{"error":"Account temporarily locked. Try again later."}"#) {
            ApiError::AccountLocked(msg) => assert!(msg.starts_with("Account temporarily locked")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with(&format!("(truncated, {} total bytes)", long.len())));

        // Multi-byte characters straddling the cut point must not panic
        let wide = "é".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(ApiError::truncate_body(&wide).contains("truncated"));
    }
}
