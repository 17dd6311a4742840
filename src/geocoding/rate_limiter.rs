use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Fixed-interval pacer shared by every geocoding request of a run.
///
/// The lock is held across the sleep, so concurrent callers queue up and
/// successive requests are never closer than `min_interval`.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_tick: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Requests per second this limiter allows, rounded down.
    pub fn max_rate_per_sec(&self) -> Option<u64> {
        if self.min_interval.is_zero() {
            None
        } else {
            Some((1000 / self.min_interval.as_millis().max(1)) as u64)
        }
    }

    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::utils::constants::DEFAULT_PACING_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_wait_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = std::time::Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sequential_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_concurrent_callers_keep_global_spacing() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(30)));
        let start = std::time::Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // four ticks need three full intervals between them
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_rate_per_second() {
        assert_eq!(RateLimiter::new(Duration::from_millis(100)).max_rate_per_sec(), Some(10));
        assert_eq!(RateLimiter::unlimited().max_rate_per_sec(), None);
    }
}
