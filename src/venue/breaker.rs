//! Circuit breaker for REST clients.
//!
//! After N consecutive failures the breaker opens and short-circuits calls
//! until the cooldown expires, at which point a single probe is allowed
//! through. A success closes the breaker; a failed probe reopens it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Per-client circuit breaker.
pub struct CircuitBreaker {
    client: &'static str,
    max_failures: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(client: &'static str, max_failures: u32, cooldown: Duration) -> Self {
        Self {
            client,
            max_failures: max_failures.max(1),
            cooldown,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    /// Gate a call. `Err(CircuitOpen)` while the breaker is open; once the
    /// cooldown expires the next caller becomes the probe.
    pub fn check(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.open_until {
            Some(until) if Instant::now() < until => Err(Error::CircuitOpen {
                client: self.client,
            }),
            Some(_) => {
                info!(client = self.client, "Circuit cooldown expired, probing");
                state.open_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record a successful call, closing the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    /// Record a failed call; opens the breaker at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.max_failures && state.open_until.is_none() {
            state.open_until = Some(Instant::now() + self.cooldown);
            warn!(
                client = self.client,
                failures = state.consecutive_failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    /// Current consecutive failure count (observability).
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.state.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new("test", 3, Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn stays_closed_below_threshold() {
        let b = breaker(1_000);
        b.record_failure();
        b.record_failure();
        assert!(b.check().is_ok());
    }

    #[test]
    fn opens_at_threshold() {
        let b = breaker(60_000);
        for _ in 0..3 {
            b.record_failure();
        }
        assert!(matches!(b.check(), Err(Error::CircuitOpen { .. })));
    }

    #[test]
    fn success_resets_failure_count() {
        let b = breaker(60_000);
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.failure_count(), 0);
        b.record_failure();
        b.record_failure();
        assert!(b.check().is_ok());
    }

    #[test]
    fn cooldown_allows_probe_then_reopens_on_failure() {
        let b = breaker(1);
        for _ in 0..3 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(5));
        // Probe allowed.
        assert!(b.check().is_ok());
        // Failed probe reopens immediately (count is already past threshold).
        b.record_failure();
        assert!(matches!(b.check(), Err(Error::CircuitOpen { .. })));
    }
}
