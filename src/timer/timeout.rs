//! Timer with a deadline

use std::time::Duration;

use super::SimpleTimer;

/// A `SimpleTimer` measured against a timeout
#[derive(Debug, Clone)]
pub struct TimeoutTimer {
    timer: SimpleTimer,
    timeout: Duration,
}

impl TimeoutTimer {
    /// Create a stopped timer with the given timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timer: SimpleTimer::new(),
            timeout,
        }
    }

    /// Create and start a timer with the given timeout
    pub fn start_new(timeout: Duration) -> Self {
        let mut timer = Self::new(timeout);
        timer.timer.start();
        timer
    }

    /// Restart with the current timeout
    pub fn restart(&mut self) {
        self.timer.restart();
    }

    /// Restart with a new timeout
    pub fn restart_with_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.timer.restart();
    }

    pub fn start(&mut self) {
        self.timer.start();
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    /// True once the elapsed time reaches the timeout
    pub fn is_timed_out(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time left until the timeout, never negative
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.timer.elapsed())
    }

    pub fn remaining_millis(&self) -> u64 {
        self.remaining().as_millis() as u64
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
