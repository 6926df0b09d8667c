//! Error types for the video resolver
//!
//! Provides the internal error enum used throughout the pipeline and
//! its mapping onto the caller-facing [`ResolutionOutcome`].

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::types::ResolutionOutcome;

/// Error type for all resolver operations
///
/// Implements Display for human-readable messages and Serialize
/// for Tauri command compatibility.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Response body exceeded the configured byte ceiling
    #[error("Response exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The resolution was cancelled while a request was in flight
    #[error("Request cancelled")]
    Cancelled,

    /// The overall resolution deadline elapsed
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limited by server (HTTP 429)
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// Failed to interpret a fetched document
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Resource or playable reference not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL failed the HTTPS / trusted-domain policy
    #[error("Rejected by security policy: {0}")]
    SecurityRejected(String),

    /// Invalid resolver configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ResolveError {
    /// Maps this error onto the caller-facing outcome taxonomy
    pub fn into_outcome(self) -> ResolutionOutcome {
        let message = self.to_string();
        match self {
            ResolveError::SecurityRejected(_) => ResolutionOutcome::SecurityRejected(message),
            ResolveError::ParseError(_) => ResolutionOutcome::ParseError(message),
            ResolveError::NotFound(_) => ResolutionOutcome::NoDataFound(message),
            ResolveError::HttpError(_)
            | ResolveError::HttpStatus { .. }
            | ResolveError::BodyTooLarge { .. }
            | ResolveError::Cancelled
            | ResolveError::Timeout(_)
            | ResolveError::RateLimited
            | ResolveError::Config(_) => ResolutionOutcome::NetworkError(message),
        }
    }
}

impl Serialize for ResolveError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_parse_error() {
        let error = ResolveError::ParseError("missing element".to_string());
        assert_eq!(error.to_string(), "Failed to parse response: missing element");
    }

    #[test]
    fn test_error_display_body_too_large() {
        let error = ResolveError::BodyTooLarge { limit: 4096 };
        assert_eq!(error.to_string(), "Response exceeded 4096 bytes");
    }

    #[test]
    fn test_error_display_http_status() {
        let error = ResolveError::HttpStatus {
            status: 503,
            url: "https://farsiland.com/x".to_string(),
        };
        assert_eq!(error.to_string(), "HTTP 503 for https://farsiland.com/x");
    }

    #[test]
    fn test_error_display_rate_limited() {
        let error = ResolveError::RateLimited;
        assert_eq!(error.to_string(), "Rate limited - too many requests");
    }

    #[test]
    fn test_outcome_mapping() {
        assert!(matches!(
            ResolveError::SecurityRejected("http".into()).into_outcome(),
            ResolutionOutcome::SecurityRejected(_)
        ));
        assert!(matches!(
            ResolveError::ParseError("bad json".into()).into_outcome(),
            ResolutionOutcome::ParseError(_)
        ));
        assert!(matches!(
            ResolveError::NotFound("nothing".into()).into_outcome(),
            ResolutionOutcome::NoDataFound(_)
        ));
        assert!(matches!(
            ResolveError::Cancelled.into_outcome(),
            ResolutionOutcome::NetworkError(_)
        ));
        assert!(matches!(
            ResolveError::BodyTooLarge { limit: 1 }.into_outcome(),
            ResolutionOutcome::NetworkError(_)
        ));
    }

    #[test]
    fn test_error_serialize() {
        let error = ResolveError::Cancelled;
        let json = serde_json::to_string(&error).expect("Serialization should succeed");
        assert_eq!(json, "\"Request cancelled\"");
    }
}
