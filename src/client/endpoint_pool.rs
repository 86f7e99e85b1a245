// =============================================================================
// Endpoint Pool — round-robin failover across equivalent base URLs
// =============================================================================
//
// Rotation is pure: `next(i) = (i + 1) mod len`.  Failures are recorded on the
// endpoint for observability only; a failing endpoint is never removed and is
// eligible again on the next cycle.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::debug;

/// A single base URL plus its failure counter.
#[derive(Debug)]
pub struct Endpoint {
    url: String,
    failures: AtomicU64,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            failures: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Record a failed attempt; returns the running total.
    pub fn mark_failed(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[cfg(test)]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Ordered, immutable set of endpoints for one logical data source.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Arc<[Endpoint]>,
}

impl EndpointPool {
    /// Build a pool from base URLs.  An empty list is rejected.
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<Endpoint> = urls.into_iter().map(Endpoint::new).collect();
        if endpoints.is_empty() {
            bail!("endpoint pool needs at least one URL");
        }
        debug!(size = endpoints.len(), "endpoint pool built");
        Ok(Self {
            endpoints: endpoints.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Endpoint at `index` (wrapped into range).
    pub fn get(&self, index: usize) -> &Endpoint {
        &self.endpoints[index % self.endpoints.len()]
    }

    /// Rotate one step: returns the next endpoint and its index.
    pub fn next(&self, current: usize) -> (&Endpoint, usize) {
        let next = (current + 1) % self.endpoints.len();
        (&self.endpoints[next], next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_to_zero() {
        let pool = EndpointPool::new(["https://a", "https://b", "https://c"]).unwrap();
        let (ep, i) = pool.next(0);
        assert_eq!((ep.url(), i), ("https://b", 1));
        let (ep, i) = pool.next(1);
        assert_eq!((ep.url(), i), ("https://c", 2));
        let (ep, i) = pool.next(2);
        assert_eq!((ep.url(), i), ("https://a", 0));
    }

    #[test]
    fn single_endpoint_always_wraps() {
        let pool = EndpointPool::new(["https://only/"]).unwrap();
        let (ep, i) = pool.next(0);
        assert_eq!(i, 0);
        assert_eq!(ep.url(), "https://only");
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(EndpointPool::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn failed_endpoint_stays_in_rotation() {
        let pool = EndpointPool::new(["https://a", "https://b"]).unwrap();
        assert_eq!(pool.get(0).mark_failed(), 1);
        assert_eq!(pool.get(0).mark_failed(), 2);
        assert_eq!(pool.get(0).failure_count(), 2);
        let (ep, _) = pool.next(1);
        assert_eq!(ep.url(), "https://a");
    }
}
