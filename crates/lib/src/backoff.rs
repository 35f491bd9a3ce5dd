//! Reconnect delay with exponential backoff, capped at a maximum.

use std::time::Duration;

/// Delay to wait before the next connection attempt. Reset on every successful
/// connection; doubled after every wait.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    current_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
}

impl ReconnectState {
    /// `min_delay` larger than `max_delay` is clamped to `max_delay`.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let min_delay = min_delay.min(max_delay);
        Self {
            current_delay: min_delay,
            min_delay,
            max_delay,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Return the delay to wait now and double the stored delay for next time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.current_delay = self.current_delay.saturating_mul(2).min(self.max_delay);
        delay
    }

    /// Connection succeeded: start over from the minimum delay.
    pub fn reset(&mut self) {
        self.current_delay = self.min_delay;
    }
}
