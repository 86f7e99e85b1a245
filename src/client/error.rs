use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy of the resilient client.
///
/// `Transport` and `RateLimited` (and 5xx `Upstream`) are retried inside the
/// client; only `ExhaustedRetries` and non-retryable `Upstream` errors ever
/// reach callers.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connect / timeout failure, or a body that could not be read as JSON.
    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// HTTP 429/418 or a payload whose error message matches a rate-limit marker.
    #[error("rate limited by {endpoint}: {message}")]
    RateLimited {
        endpoint: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Non-2xx, non-429 status, or a well-formed JSON-RPC `error` member.
    #[error("upstream error from {endpoint} (status {status:?}): {message}")]
    Upstream {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// The request could not be shaped for the wire (e.g. signing failed).
    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("exhausted {cycles} retry cycles across all endpoints; last error: {last}")]
    ExhaustedRetries { cycles: u32, last: Box<ClientError> },
}

impl ClientError {
    /// Whether the retry loop should move on to the next endpoint.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } => matches!(status, Some(s) if *s >= 500),
            Self::Encode(_) | Self::ExhaustedRetries { .. } => false,
        }
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::ExhaustedRetries { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16) -> ClientError {
        ClientError::Upstream {
            endpoint: "https://a".into(),
            status: Some(status),
            message: "boom".into(),
        }
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        assert!(upstream(500).is_retryable());
        assert!(upstream(503).is_retryable());
        assert!(!upstream(400).is_retryable());
        assert!(!upstream(404).is_retryable());
    }

    #[test]
    fn exhausted_is_terminal_and_keeps_last_error() {
        let err = ClientError::ExhaustedRetries {
            cycles: 3,
            last: Box::new(upstream(502)),
        };
        assert!(!err.is_retryable());
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("status Some(502)"));
    }
}
