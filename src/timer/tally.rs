//! Running byte total with a per-second rate

use std::time::Duration;

use super::SimpleTimer;

/// Counts bytes and reports the rate over the last whole-second window
///
/// The rate is recomputed lazily when queried and at least one second has
/// passed since the last computation; the sub-second remainder is carried
/// into the next window.
#[derive(Debug, Clone)]
pub struct ByteTally {
    total: u64,
    per_second: u64,
    previous_total: u64,
    window: SimpleTimer,
}

impl ByteTally {
    pub fn new() -> Self {
        Self {
            total: 0,
            per_second: 0,
            previous_total: 0,
            window: SimpleTimer::start_new(),
        }
    }

    /// Add bytes, returning the new total
    pub fn add(&mut self, amount: u64) -> u64 {
        self.total = self.total.saturating_add(amount);
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes per second over the most recently completed window
    pub fn per_second(&mut self) -> u64 {
        let elapsed_ms = self.window.elapsed_millis();
        if elapsed_ms >= 1000 {
            let seconds = elapsed_ms / 1000;
            self.per_second = (self.total - self.previous_total) / seconds;
            self.previous_total = self.total;
            self.window
                .restart_with_offset(Duration::from_millis(elapsed_ms % 1000));
        }
        self.per_second
    }
}

impl Default for ByteTally {
    fn default() -> Self {
        Self::new()
    }
}
