//! Stopwatch with a settable starting offset

use std::time::{Duration, Instant};

/// A stopwatch that reports `offset + measured time`
///
/// Starting from an offset lets a restarted timer carry over a remainder,
/// e.g. the fractional second of a rate window.
#[derive(Debug, Clone)]
pub struct SimpleTimer {
    /// Time added on top of the measured time
    offset: Duration,

    /// Time measured by previous start/stop runs
    accumulated: Duration,

    /// Start of the current run, `None` while stopped
    started_at: Option<Instant>,
}

impl SimpleTimer {
    /// Create a stopped timer at zero
    pub fn new() -> Self {
        Self::with_offset(Duration::ZERO)
    }

    /// Create a stopped timer that already reports `offset`
    pub fn with_offset(offset: Duration) -> Self {
        Self {
            offset,
            accumulated: Duration::ZERO,
            started_at: None,
        }
    }

    /// Create and start a timer at zero
    pub fn start_new() -> Self {
        Self::start_new_with_offset(Duration::ZERO)
    }

    /// Create and start a timer that already reports `offset`
    pub fn start_new_with_offset(offset: Duration) -> Self {
        let mut timer = Self::with_offset(offset);
        timer.start();
        timer
    }

    /// Resume measuring. No-op if already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Pause measuring; elapsed time stays frozen until the next `start`.
    pub fn stop(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.accumulated += started.elapsed();
        }
    }

    /// Stop and discard measured time (the offset is kept)
    pub fn reset(&mut self) {
        self.started_at = None;
        self.accumulated = Duration::ZERO;
    }

    /// Reset to zero and start again
    pub fn restart(&mut self) {
        self.restart_with_offset(Duration::ZERO);
    }

    /// Reset, replace the offset, and start again
    pub fn restart_with_offset(&mut self, offset: Duration) {
        self.offset = offset;
        self.accumulated = Duration::ZERO;
        self.started_at = Some(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Offset plus all measured time
    pub fn elapsed(&self) -> Duration {
        let running = self
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO);
        self.offset + self.accumulated + running
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

impl Default for SimpleTimer {
    fn default() -> Self {
        Self::new()
    }
}
