//! Exponential retry delay for transient sync failures.

use std::time::Duration;

/// Doubling delay starting at `initial`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    /// Delay before the next retry; each call doubles the previous one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .current
            .map_or(self.initial, |current| current.saturating_mul(2))
            .min(self.max);
        self.current = Some(delay);
        delay
    }

    /// Forget past failures after a successful pass.
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub const fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }
}
