//! Exponential backoff for background loops that talk to the database,
//! so an outage doesn't turn the flush ticker into a tight retry loop.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    not_before: Instant,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            current: base,
            not_before: Instant::now(),
        }
    }

    pub fn ready(&self) -> bool {
        Instant::now() >= self.not_before
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.not_before = Instant::now();
    }

    /// Record a failure; returns how long the next attempt is deferred.
    pub fn fail(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.not_before = Instant::now() + delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_ready_and_defers_after_failure() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert!(backoff.ready());

        backoff.fail();
        assert!(!backoff.ready());

        backoff.reset();
        assert!(backoff.ready());
    }

    #[test]
    fn delay_doubles_and_saturates_at_max() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(25));
        assert_eq!(backoff.fail(), Duration::from_millis(10));
        assert_eq!(backoff.fail(), Duration::from_millis(20));
        assert_eq!(backoff.fail(), Duration::from_millis(25));
        assert_eq!(backoff.fail(), Duration::from_millis(25));
    }
}
