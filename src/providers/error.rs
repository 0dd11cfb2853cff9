//! Error type shared by the transcription back-ends.

use thiserror::Error;

/// Everything that can go wrong during a single transcription call.
///
/// The orchestrator never propagates these; it stores their `Display` text
/// as the failure message of the provider's result.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429 from the back-end.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP status, with the message extracted from the body.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The back-end answered 2xx but the body did not have the expected shape.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    /// The back-end accepted the call but produced no usable transcript.
    #[error("{0}")]
    Rejected(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = ProviderError::RateLimited { retry_after_ms: 5000 };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_display() {
        let err = ProviderError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }

    #[test]
    fn rejected_display_is_the_bare_message() {
        let err = ProviderError::Rejected("quota exceeded".into());
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProviderError>();
    }
}
