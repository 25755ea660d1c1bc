//! Per-connection byte counters and close bookkeeping

use std::ops::Add;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TandemError;
use crate::timer::{ByteTally, SimpleTimer};

use super::ClosingReason;

/// Point-in-time view of a connection's traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounts {
    pub inbound_total: u64,
    pub outbound_total: u64,
    pub inbound_per_second: u64,
    pub outbound_per_second: u64,
}

impl Add for ByteCounts {
    type Output = ByteCounts;

    fn add(self, other: ByteCounts) -> ByteCounts {
        ByteCounts {
            inbound_total: self.inbound_total + other.inbound_total,
            outbound_total: self.outbound_total + other.outbound_total,
            inbound_per_second: self.inbound_per_second + other.inbound_per_second,
            outbound_per_second: self.outbound_per_second + other.outbound_per_second,
        }
    }
}

/// Inbound and outbound byte tallies of one transport
#[derive(Debug, Default)]
pub struct ByteRecord {
    inbound: Mutex<ByteTally>,
    outbound: Mutex<ByteTally>,
}

impl ByteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_inbound(&self, bytes: usize) {
        self.inbound.lock().add(bytes as u64);
    }

    pub fn add_outbound(&self, bytes: usize) {
        self.outbound.lock().add(bytes as u64);
    }

    pub fn snapshot(&self) -> ByteCounts {
        let mut inbound = self.inbound.lock();
        let mut outbound = self.outbound.lock();
        ByteCounts {
            inbound_total: inbound.total(),
            outbound_total: outbound.total(),
            inbound_per_second: inbound.per_second(),
            outbound_per_second: outbound.per_second(),
        }
    }
}

#[derive(Default)]
struct CloseRecord {
    reason: ClosingReason,
    error: Option<Arc<TandemError>>,
}

/// Closed flag, first closing reason, and lifetime clock of a connection
pub(crate) struct Lifecycle {
    closed: AtomicBool,
    record: Mutex<CloseRecord>,
    alive: Mutex<SimpleTimer>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            record: Mutex::new(CloseRecord::default()),
            alive: Mutex::new(SimpleTimer::start_new()),
        }
    }

    /// Record the close; false if the connection was already closed
    pub(crate) fn close(&self, reason: ClosingReason, error: Option<TandemError>) -> bool {
        let mut record = self.record.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        record.reason = reason;
        record.error = error.map(Arc::new);
        self.alive.lock().stop();
        self.closed.store(true, Ordering::Release);
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn reason(&self) -> ClosingReason {
        self.record.lock().reason
    }

    pub(crate) fn error(&self) -> Option<Arc<TandemError>> {
        self.record.lock().error.clone()
    }

    pub(crate) fn time_alive(&self) -> Duration {
        self.alive.lock().elapsed()
    }
}
