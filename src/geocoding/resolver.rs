use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::client::{DisabledLookup, GeocodeLookup, OpenCageClient};
use super::outcome::GeocodeOutcome;
use super::rate_limiter::RateLimiter;
use crate::config::GeocodingConfig;
use crate::error::Result;
use crate::utils::constants::MAX_BACKOFF_EXPONENT;

/// Bounded exponential backoff for transient geocoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1)
    /// plus up to one base of jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let jitter_ms = rand::thread_rng().gen_range(0..base_ms);
        Duration::from_millis(base_ms * (1 << exponent) + jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::utils::constants::DEFAULT_MAX_RETRIES,
            Duration::from_millis(crate::utils::constants::DEFAULT_BACKOFF_BASE_MS),
        )
    }
}

/// Resolves free-text location queries to coordinates.
///
/// Every attempt waits on the shared rate limiter first. Only transient
/// outcomes are retried; the result is always an outcome, never an error.
#[derive(Clone)]
pub struct GeocodeResolver {
    lookup: Arc<dyn GeocodeLookup>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    requests: Arc<AtomicUsize>,
}

impl GeocodeResolver {
    pub fn new(lookup: Arc<dyn GeocodeLookup>, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            lookup,
            limiter: Arc::new(limiter),
            retry,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build the HTTP-backed resolver, or a disabled one when no key is set.
    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        let lookup: Arc<dyn GeocodeLookup> = if config.has_credential() {
            Arc::new(OpenCageClient::from_config(config)?)
        } else {
            warn!("No geocoding credential configured; missing coordinates will use the fallback");
            Arc::new(DisabledLookup)
        };

        let limiter = RateLimiter::new(config.pacing());
        match limiter.max_rate_per_sec() {
            Some(rate) => debug!("Geocoding limited to {} requests/s", rate),
            None => debug!("Geocoding requests are not paced"),
        }

        Ok(Self::new(
            lookup,
            limiter,
            RetryPolicy::new(config.max_retries, config.backoff_base()),
        ))
    }

    pub async fn resolve(&self, query: &str) -> GeocodeOutcome {
        let query = query.trim();
        if query.is_empty() {
            return GeocodeOutcome::NotFound;
        }
        if !self.lookup.is_remote() {
            return self.lookup.lookup(query).await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.wait().await;
            self.requests.fetch_add(1, Ordering::Relaxed);

            match self.lookup.lookup(query).await {
                GeocodeOutcome::Transient(reason) if attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        query,
                        attempt, %reason, "geocoding lookup failed; retrying after {:?}", delay
                    );
                    sleep(delay).await;
                }
                outcome => {
                    debug!(query, attempt, outcome = outcome.label(), "geocoding finished");
                    return outcome;
                }
            }
        }
    }

    /// Requests handed to the lookup so far, retries included.
    pub fn requests_issued(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}
