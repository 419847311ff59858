//! Per-dependency circuit breaker (§4.2): closed → open → half-open → closed.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    window_start: Instant,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            window,
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                window_start: Instant::now(),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Whether a call against this dependency may proceed right now. In
    /// `HalfOpen`, exactly one probe call is admitted until it resolves.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                if opened_at.elapsed() >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.window_start = Instant::now();
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("circuit breaker '{}' re-opened after failed probe", self.name);
            }
            BreakerState::Closed => {
                if inner.window_start.elapsed() > self.window {
                    inner.consecutive_failures = 0;
                    inner.window_start = Instant::now();
                }
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        "circuit breaker '{}' tripped after {} consecutive failures",
                        self.name, inner.consecutive_failures
                    );
                }
            }
            BreakerState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new("llm", 3, Duration::from_secs(30), Duration::from_millis(20));
        assert!(cb.allow_call());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow_call());
    }

    #[test]
    fn half_open_probe_then_close_on_success() {
        let cb = CircuitBreaker::new("llm", 1, Duration::from_secs(30), Duration::from_millis(10));
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_call());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("llm", 1, Duration::from_secs(30), Duration::from_millis(10));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_call());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let cb = CircuitBreaker::new("llm", 3, Duration::from_secs(30), Duration::from_millis(10));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
