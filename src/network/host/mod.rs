//! Hosts
//!
//! Listeners driven by a `ThreadRun` worker. Each tick accepts pending
//! sockets, publishes new connections to a poll queue, and prunes the ones
//! that are no longer active.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

use super::{ClosingReason, NetConnection};

mod tcp_host;
mod hybrid_host;

pub use tcp_host::TcpHost;
pub use hybrid_host::HybridHost;

/// Lifecycle of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

/// A listener publishing established connections
pub trait Host {
    type Connection: NetConnection;

    /// Start accepting on the worker thread
    fn start(&self) -> Result<()>;

    /// Stop the worker, close the listener and every live connection
    fn close(&self);

    /// Next connection not yet claimed; inactive ones are closed and skipped
    fn poll_new_connection(&self) -> Option<Arc<Self::Connection>>;

    fn local_addr(&self) -> SocketAddr;

    fn state(&self) -> HostState;

    fn active_connection_count(&self) -> usize;
}

/// State shared by a host handle and its worker
pub(crate) struct HostShared<C> {
    state: Mutex<HostState>,
    active: Mutex<Vec<Arc<C>>>,
    fresh: Mutex<VecDeque<Arc<C>>>,
}

impl<C: NetConnection> HostShared<C> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HostState::Stopped),
            active: Mutex::new(Vec::new()),
            fresh: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn state(&self) -> HostState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: HostState) {
        *self.state.lock() = state;
    }

    /// Track a new connection and make it pollable
    pub(crate) fn publish(&self, connection: Arc<C>) {
        self.active.lock().push(Arc::clone(&connection));
        self.fresh.lock().push_back(connection);
    }

    pub(crate) fn poll_new(&self) -> Option<Arc<C>> {
        let mut fresh = self.fresh.lock();
        while let Some(connection) = fresh.pop_front() {
            if connection.is_active() {
                return Some(connection);
            }
            connection.close(ClosingReason::ClosedSelf, None);
        }
        None
    }

    /// Close and drop every connection that is no longer active
    pub(crate) fn prune(&self) -> usize {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|connection| {
            if connection.is_active() {
                return true;
            }
            connection.close(ClosingReason::ClosedSelf, None);
            tracing::debug!(
                "connection {} removed [{}]",
                connection.remote_addr(),
                connection.closing_reason()
            );
            false
        });
        before - active.len()
    }

    /// Live connection matching `predicate`
    pub(crate) fn find(&self, predicate: impl Fn(&C) -> bool) -> Option<Arc<C>> {
        self.active
            .lock()
            .iter()
            .find(|connection| predicate(connection.as_ref()))
            .cloned()
    }

    /// Force-close everything, claimed or not
    pub(crate) fn close_all(&self) {
        let active: Vec<Arc<C>> = self.active.lock().drain(..).collect();
        for connection in active {
            connection.close(ClosingReason::ClosedSelf, None);
        }
        self.fresh.lock().clear();
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}
