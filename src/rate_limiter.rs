use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Length of the rolling window that `rate_limit_per_minute` applies to.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by source id.
///
/// Each source keeps its own list of admission timestamps, so one busy
/// source never consumes another source's budget. Callers that hit the limit
/// are delayed with [`RateLimiter::acquire`] rather than rejected.
///
/// Time is read from `tokio::time::Instant`, which lets tests running with a
/// paused clock advance through the window instantly.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    admissions: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Admits a call for `source_id` if fewer than `limit` calls were admitted
    /// within the window. Rejected calls are not recorded.
    pub fn allow(&self, source_id: &str, limit: u32) -> bool {
        self.try_admit(source_id, limit).is_ok()
    }

    /// How long a caller would have to wait for the next slot right now.
    pub fn wait_time(&self, source_id: &str, limit: u32) -> Duration {
        let now = Instant::now();
        let limit = limit.max(1) as usize;
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        let stamps = admissions.entry(source_id.to_string()).or_default();
        self.evict(stamps, now);

        if stamps.len() < limit {
            Duration::ZERO
        } else {
            stamps
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO)
        }
    }

    /// Waits until the window admits a call for `source_id`, then records it.
    pub async fn acquire(&self, source_id: &str, limit: u32) {
        loop {
            match self.try_admit(source_id, limit) {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(
                        "Rate limit reached for source {} ({} / min), waiting {:?}",
                        source_id,
                        limit,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of admissions currently inside the window for `source_id`.
    pub fn in_window(&self, source_id: &str) -> usize {
        let now = Instant::now();
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        match admissions.get_mut(source_id) {
            Some(stamps) => {
                self.evict(stamps, now);
                stamps.len()
            }
            None => 0,
        }
    }

    fn try_admit(&self, source_id: &str, limit: u32) -> Result<(), Duration> {
        let now = Instant::now();
        // A zero limit would block forever.
        let limit = limit.max(1) as usize;
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        let stamps = admissions.entry(source_id.to_string()).or_default();
        self.evict(stamps, now);

        if stamps.len() < limit {
            stamps.push_back(now);
            return Ok(());
        }

        let wait = stamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);
        Err(wait.max(Duration::from_millis(1)))
    }

    fn evict(&self, stamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();

        assert!(limiter.allow("ca-sos", 3));
        assert!(limiter.allow("ca-sos", 3));
        assert!(limiter.allow("ca-sos", 3));
        assert!(!limiter.allow("ca-sos", 3));
        assert_eq!(limiter.in_window("ca-sos"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("ca-sos", 1));
        assert!(!limiter.allow("ca-sos", 1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!limiter.allow("ca-sos", 1));
        assert_eq!(limiter.wait_time("ca-sos", 1), Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.allow("ca-sos", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("a", 1));
        assert!(!limiter.allow("a", 1));
        assert!(limiter.allow("b", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_delays_instead_of_dropping() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire("tx-sos", 2).await;
        }

        // The third call had to wait for the first admission to leave the window.
        assert!(start.elapsed() >= RATE_WINDOW);
        assert_eq!(limiter.in_window("tx-sos"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_still_drains() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("misconfigured", 0));
        assert!(!limiter.allow("misconfigured", 0));
    }
}
