//! Packet queue
//!
//! Thread-safe FIFO of packets belonging to one contract group.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::protocol::{GroupTable, Packet};
use crate::timer::SimpleTimer;

/// FIFO of packets with the time since the last enqueue
pub struct PacketQueue {
    group: Arc<GroupTable>,
    packets: Mutex<VecDeque<Packet>>,
    available: Condvar,
    last_enqueue: Mutex<SimpleTimer>,
}

impl PacketQueue {
    pub fn new(group: Arc<GroupTable>) -> Self {
        Self {
            group,
            packets: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            last_enqueue: Mutex::new(SimpleTimer::start_new()),
        }
    }

    /// Append a packet and restart the activity clock
    pub fn enqueue(&self, packet: Packet) {
        self.packets.lock().push_back(packet);
        self.available.notify_one();
        self.last_enqueue.lock().restart();
    }

    /// Take the oldest packet, if any
    pub fn poll_dequeue(&self) -> Option<Packet> {
        self.packets.lock().pop_front()
    }

    /// Take the oldest packet, waiting at most `timeout` for one to arrive
    ///
    /// Returns early with `None` when `interrupt` is called.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Packet> {
        let mut packets = self.packets.lock();
        if packets.is_empty() {
            self.available.wait_for(&mut packets, timeout);
        }
        packets.pop_front()
    }

    /// Wake every thread blocked in `dequeue_timeout`
    pub fn interrupt(&self) {
        let _packets = self.packets.lock();
        self.available.notify_all();
    }

    /// Contract group the queued packets belong to
    pub fn group(&self) -> &Arc<GroupTable> {
        &self.group
    }

    pub fn has_next(&self) -> bool {
        !self.packets.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_next()
    }

    pub fn time_since_last_enqueue(&self) -> Duration {
        self.last_enqueue.lock().elapsed()
    }
}
