use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Consecutive-failure breaker. Recovery is checked lazily on the next
/// `allow_request`, there is no background timer.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                cooldown: config.cooldown,
            },
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allow_request(&self) -> bool {
        let mut state = self.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = state
                    .last_failure
                    .map(|at| Instant::now().duration_since(at) >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    state.state = CircuitState::HalfOpen;
                    state.failure_count = 0;
                    tracing::info!("circuit half-open, letting a probe through");
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            tracing::info!("probe succeeded, circuit closed");
        }
        if state.state != CircuitState::Open {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::Open {
            return;
        }
        state.failure_count = state.failure_count.saturating_add(1);
        if state.failure_count >= self.config.failure_threshold {
            let reopened = state.state == CircuitState::HalfOpen;
            state.state = CircuitState::Open;
            state.last_failure = Some(Instant::now());
            tracing::warn!(
                failures = state.failure_count,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                reopened,
                "circuit opened"
            );
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failure_count,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        })
    }

    #[test]
    fn opens_exactly_at_the_threshold() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn fewer_failures_than_threshold_never_open() {
        for n in 0..=5 {
            let breaker = breaker();
            for _ in 0..n {
                breaker.record_failure();
            }
            let expected = if n == 5 {
                CircuitState::Open
            } else {
                CircuitState::Closed
            };
            assert_eq!(breaker.snapshot().state, expected, "after {n} failures");
        }
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(
            breaker.snapshot(),
            CircuitSnapshot {
                state: CircuitState::Closed,
                failure_count: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stays_open_until_the_cooldown_elapses() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.allow_request());
        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!breaker.allow_request());
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.allow_request());
        assert_eq!(
            breaker.snapshot(),
            CircuitSnapshot {
                state: CircuitState::HalfOpen,
                failure_count: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes_the_circuit() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.allow_request());

        breaker.record_success();
        assert_eq!(
            breaker.snapshot(),
            CircuitSnapshot {
                state: CircuitState::Closed,
                failure_count: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_reopens_when_failures_reach_the_threshold_again() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.allow_request());

        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        // cooldown restarts from the reopen
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!breaker.allow_request());
    }
}
