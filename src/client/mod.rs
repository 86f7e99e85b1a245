// =============================================================================
// Resilient Client Module
// =============================================================================
//
// Shared HTTP plumbing for both upstream venues:
// - Endpoint pool with round-robin failover
// - Transport seam (reqwest in production, scripted fakes in tests)
// - Retry / backoff / rate-limit state machine
//
// Venue-specific request shaping lives behind the `WireFormat` trait so the
// retry loop is written exactly once.

pub mod endpoint_pool;
pub mod error;
pub mod resilient;
pub mod transport;

pub use endpoint_pool::{Endpoint, EndpointPool};
pub use error::ClientError;
pub use resilient::{RequestEnvelope, ResilientClient, RetryPolicy, WireFormat};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Substrings that mark an application-level rate-limit message.
const RATE_LIMIT_MARKERS: [&str; 3] = ["rate limit", "too many", "request weight"];

/// Return `true` if `message` looks like a rate-limit complaint from upstream.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_markers_match_case_insensitively() {
        assert!(is_rate_limit_message("Too Many Requests"));
        assert!(is_rate_limit_message("429: RATE LIMIT exceeded for IP"));
        assert!(is_rate_limit_message(
            "Way too much request weight used; IP banned until 1700000000000."
        ));
        assert!(!is_rate_limit_message("Invalid symbol."));
    }
}
