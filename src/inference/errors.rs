//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured
//! logging is the caller's responsibility — these types carry the context
//! needed to build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body did not match the expected completion shape.
    #[error("malformed completion response: {reason}")]
    MalformedResponse { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_carries_status_and_body() {
        let err = InferenceError::HttpError {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: overloaded");
    }

    #[test]
    fn malformed_response_display() {
        let err = InferenceError::MalformedResponse {
            reason: "no choices".to_string(),
        };
        assert!(err.to_string().contains("no choices"));
    }
}
