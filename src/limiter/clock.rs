//! Time sources for the rate limiter.
//!
//! The table reads time through [`Clock`]; [`LimiterClock`] hands the same
//! source to each `governor` limiter so admission math and idle eviction
//! always agree on "now".

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source injected into the client table.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to, for deterministic admission and sweep tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Adapter exposing an injected [`Clock`] as a `governor` clock.
#[derive(Clone)]
pub struct LimiterClock(Arc<dyn Clock>);

impl LimiterClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self(clock)
    }
}

impl governor::clock::Clock for LimiterClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.0.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - start, Duration::from_secs(5));
    }

    #[test]
    fn test_limiter_clock_follows_injected_clock() {
        use governor::clock::Clock as _;

        let manual = Arc::new(ManualClock::new());
        let limiter_clock = LimiterClock::new(manual.clone());
        assert_eq!(limiter_clock.now(), Clock::now(manual.as_ref()));

        manual.advance(Duration::from_millis(250));
        assert_eq!(limiter_clock.now(), Clock::now(manual.as_ref()));
    }
}
