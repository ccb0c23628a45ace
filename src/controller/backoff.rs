//! # Fibonacci Backoff
//!
//! Retry delays for failed ApplicationSet passes. Delays grow along the Fibonacci sequence
//! in whole minutes and are capped, so a persistently failing provider is retried at a
//! steady rate instead of doubling away.
//!
//! With the controller defaults (1 minute minimum, 10 minute cap):
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...
//!
//! ```rust
//! use applicationset_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator, state kept in minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// `min_minutes` is used for the first two delays, `max_minutes` caps the sequence
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let seconds = self.current_minutes * 60;
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);
        seconds
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays, vec![60, 60, 120, 180, 300, 480, 600, 600, 600]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        for _ in 0..4 {
            backoff.next_backoff_seconds();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff = FibonacciBackoff::new(2, 5);
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays, vec![120, 120, 240, 300, 300]);
    }
}
