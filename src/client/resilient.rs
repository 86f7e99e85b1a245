// =============================================================================
// Resilient Client — retry, backoff, rate-limit handling, endpoint failover
// =============================================================================
//
// State machine per call:
//
//   attempt = 0, index = 0
//   loop:
//     send to pool[index]
//     2xx + well-formed body          => return payload
//     non-retryable upstream error    => return error
//     transport / 5xx / rate-limited  => index = (index + 1) mod N
//        index != 0                   => try next endpoint immediately
//        index == 0 (cycle complete)  => attempt += 1
//             attempt > max_retries   => ExhaustedRetries(last error)
//             otherwise sleep Retry-After (if any 429 in the cycle sent one)
//                             else base_delay * 2^(attempt - 1)
//
// Every loop iteration is an await point; backoff uses `tokio::time::sleep` so
// it never blocks unrelated tasks.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::transport::{HttpRequest, HttpResponse, Transport};
use super::{is_rate_limit_message, ClientError, Endpoint, EndpointPool};

/// Retry tunables shared by both venue adapters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of additional full cycles over the pool after the first one.
    pub max_retries: u32,
    /// Backoff base; the n-th retry cycle waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    /// Upper bound applied to server-supplied `Retry-After` values.
    pub max_retry_after: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

/// Per-attempt request description.  Built fresh for every endpoint tried and
/// dropped once the attempt resolves.
#[derive(Debug)]
pub struct RequestEnvelope<'a, P> {
    pub method: &'a str,
    pub params: &'a P,
    /// Correlation id; only the JSON-RPC format puts it on the wire.
    pub id: Uuid,
}

impl<'a, P> RequestEnvelope<'a, P> {
    pub fn new(method: &'a str, params: &'a P) -> Self {
        Self {
            method,
            params,
            id: Uuid::new_v4(),
        }
    }
}

/// Venue-specific request shaping and payload interpretation.
pub trait WireFormat: Send + Sync {
    type Params: Send + Sync;

    /// Turn an envelope into a concrete HTTP request against `endpoint`.
    fn encode(
        &self,
        endpoint: &Endpoint,
        envelope: &RequestEnvelope<'_, Self::Params>,
    ) -> Result<HttpRequest, ClientError>;

    /// Inspect a parsed 2xx body.  Application-level errors are reported here;
    /// rate-limit complaints must come back as `ClientError::RateLimited`.
    fn decode(&self, endpoint: &Endpoint, body: Value) -> Result<Value, ClientError>;

    /// Hook for every raw response (headers included), successful or not.
    fn observe(&self, _response: &HttpResponse) {}
}

/// Multi-endpoint client generic over the wire format.
pub struct ResilientClient<F: WireFormat> {
    source: String,
    pool: EndpointPool,
    policy: RetryPolicy,
    format: F,
    transport: Arc<dyn Transport>,
}

impl<F: WireFormat> ResilientClient<F> {
    pub fn new(
        source: impl Into<String>,
        pool: EndpointPool,
        policy: RetryPolicy,
        format: F,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            source: source.into(),
            pool,
            policy,
            format,
            transport,
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Issue `method` with `params`, failing over and backing off as needed.
    pub async fn call(&self, method: &str, params: &F::Params) -> Result<Value, ClientError> {
        let mut attempt: u32 = 0;
        let mut index: usize = 0;
        let mut cycle_retry_after: Option<Duration> = None;

        loop {
            let endpoint = self.pool.get(index);
            let envelope = RequestEnvelope::new(method, params);

            let err = match self.attempt(endpoint, &envelope).await {
                Ok(value) => {
                    debug!(source = %self.source, method, endpoint = endpoint.url(), "call succeeded");
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(source = %self.source, method, endpoint = endpoint.url(), error = %e, "non-retryable upstream error");
                    return Err(e);
                }
                Err(e) => e,
            };

            let failures = endpoint.mark_failed();
            warn!(
                source = %self.source,
                method,
                endpoint = endpoint.url(),
                attempt,
                failures,
                error = %err,
                "request failed, failing over"
            );

            if let Some(hint) = err.retry_after() {
                cycle_retry_after = Some(cycle_retry_after.map_or(hint, |prev| prev.max(hint)));
            }

            let (_, next) = self.pool.next(index);
            index = next;
            if index != 0 {
                continue;
            }

            attempt += 1;
            if attempt > self.policy.max_retries {
                error!(
                    source = %self.source,
                    method,
                    endpoints = self.pool.len(),
                    max_retries = self.policy.max_retries,
                    "all endpoints and retries exhausted"
                );
                return Err(ClientError::ExhaustedRetries {
                    cycles: self.policy.max_retries,
                    last: Box::new(err),
                });
            }

            let delay = match cycle_retry_after.take() {
                Some(hint) => hint.min(self.policy.max_retry_after),
                None => self.policy.backoff(attempt),
            };
            info!(
                source = %self.source,
                method,
                attempt,
                max_retries = self.policy.max_retries,
                delay_secs = delay.as_secs_f64(),
                "backing off before next cycle"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        envelope: &RequestEnvelope<'_, F::Params>,
    ) -> Result<Value, ClientError> {
        let request = self.format.encode(endpoint, envelope)?;
        let url = endpoint.url().to_string();
        // Report the base URL only: request URLs may carry a signature.
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| match e {
                ClientError::Transport { message, .. } => ClientError::Transport {
                    endpoint: url.clone(),
                    message,
                },
                other => other,
            })?;
        self.format.observe(&response);

        if !response.is_success() {
            let message = truncate(&response.body, 256);
            if matches!(response.status, 429 | 418) || is_rate_limit_message(&message) {
                return Err(ClientError::RateLimited {
                    endpoint: url,
                    message,
                    retry_after: response.retry_after(),
                });
            }
            return Err(ClientError::Upstream {
                endpoint: url,
                status: Some(response.status),
                message,
            });
        }

        let body: Value =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Transport {
                endpoint: url,
                message: format!("invalid JSON body: {e}"),
            })?;
        self.format.decode(endpoint, body)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
