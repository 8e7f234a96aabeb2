use crate::errors::PipelineError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive failures that open a circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Time an open circuit waits before allowing a trial call.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    trial_in_flight: bool,
}

/// Circuit breaker guarding a single data source.
///
/// # States
///
/// - **CLOSED**: Normal operation, calls pass through. Each failure bumps the
///   consecutive failure count; reaching the threshold opens the circuit.
/// - **OPEN**: Calls fail fast with [`PipelineError::CircuitOpen`] until the
///   cooldown has elapsed since the circuit opened.
/// - **HALF_OPEN**: Exactly one trial call is let through. Success closes the
///   circuit, failure re-opens it and restarts the cooldown.
///
/// # Example
///
/// ```rust
/// use lien_prospect_pipeline::circuit_breaker::CircuitBreaker;
///
/// let breaker = CircuitBreaker::new("ca-sos", 5, std::time::Duration::from_secs(30));
/// // breaker.allow()?;
/// // match fetch().await {
/// //     Ok(_) => breaker.record_success(),
/// //     Err(_) => breaker.record_failure(),
/// // }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    source_id: String,
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(source_id: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState {
                    status: CircuitStatus::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                },
                trial_in_flight: false,
            }),
        }
    }

    /// Asks permission to make a call.
    ///
    /// Moves an open circuit to half-open once the cooldown has elapsed and
    /// hands out the single trial slot.
    pub fn allow(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        match inner.state.status {
            CircuitStatus::Closed => Ok(()),
            CircuitStatus::Open => {
                let cooled_down = inner
                    .state
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    tracing::info!("Circuit for {} is half-open, allowing trial call", self.source_id);
                    inner.state.status = CircuitStatus::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(self.rejected())
                }
            }
            CircuitStatus::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejected())
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state.status != CircuitStatus::Closed {
            tracing::info!("✓ Circuit for {} closed", self.source_id);
        }
        inner.state = CircuitState {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
        };
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state.consecutive_failures = inner.state.consecutive_failures.saturating_add(1);
        inner.trial_in_flight = false;

        match inner.state.status {
            CircuitStatus::HalfOpen => {
                tracing::warn!("Trial call for {} failed, circuit re-opened", self.source_id);
                inner.state.status = CircuitStatus::Open;
                inner.state.opened_at = Some(Instant::now());
            }
            CircuitStatus::Closed if inner.state.consecutive_failures >= self.threshold => {
                tracing::warn!(
                    "Circuit for {} opened after {} consecutive failures",
                    self.source_id,
                    inner.state.consecutive_failures
                );
                inner.state.status = CircuitStatus::Open;
                inner.state.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    fn rejected(&self) -> PipelineError {
        PipelineError::CircuitOpen {
            source_id: self.source_id.clone(),
        }
    }
}

/// One breaker per source id, created on first use with shared settings.
#[derive(Debug)]
pub struct CircuitBreakers {
    threshold: u32,
    cooldown: Duration,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreakers {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_source(&self, source_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(source_id, self.threshold, self.cooldown)))
            .clone()
    }

    pub fn state(&self, source_id: &str) -> Option<CircuitState> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers.get(source_id).map(|b| b.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_breaker() -> CircuitBreaker {
        let cb = CircuitBreaker::new("test", 5, Duration::from_secs(30));
        for _ in 0..5 {
            assert!(cb.allow().is_ok());
            cb.record_failure();
        }
        cb
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = open_breaker();

        let state = cb.state();
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.consecutive_failures, 5);
        assert!(state.opened_at.is_some());

        match cb.allow() {
            Err(PipelineError::CircuitOpen { source_id }) => assert_eq!(source_id, "test"),
            other => panic!("Expected circuit to be open and reject requests, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", 5, Duration::from_secs(30));
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        cb.record_failure();

        let state = cb.state();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_exactly_one_trial() {
        let cb = open_breaker();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.allow().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.allow().is_ok());
        assert_eq!(cb.state().status, CircuitStatus::HalfOpen);
        assert!(cb.allow().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = open_breaker();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(cb.allow().is_ok());
        cb.record_success();

        let state = cb.state();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(cb.allow().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_cooldown() {
        let cb = open_breaker();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(cb.allow().is_ok());
        cb.record_failure();
        assert_eq!(cb.state().status, CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(cb.allow().is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.allow().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_shares_breaker_per_source() {
        let breakers = CircuitBreakers::new(2, Duration::from_secs(10));
        breakers.for_source("a").record_failure();
        breakers.for_source("a").record_failure();

        assert_eq!(breakers.state("a").map(|s| s.status), Some(CircuitStatus::Open));
        assert!(breakers.state("b").is_none());
        assert!(breakers.for_source("b").allow().is_ok());
    }
}
