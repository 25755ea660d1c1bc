//! Awaitable invoked work

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Result, TandemError};

/// Outcome of work queued with `ThreadRun::invoke_func`
///
/// Resolves to the work's result, its error, `Panicked` if it panicked, or
/// `InvokeCancelled` if the scheduler dropped it without running it.
pub struct InvokeHandle<T> {
    receiver: Receiver<Result<T>>,
}

/// Sending half, moved into the queued work
pub(crate) struct InvokeCompleter<T> {
    sender: Sender<Result<T>>,
}

impl<T> InvokeHandle<T> {
    pub(crate) fn pair() -> (Self, InvokeCompleter<T>) {
        let (sender, receiver) = channel::bounded(1);
        (Self { receiver }, InvokeCompleter { sender })
    }

    /// Block until the work has run (or was dropped)
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .unwrap_or(Err(TandemError::InvokeCancelled))
    }

    /// Block for at most `timeout`; gives the handle back if still pending
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(TandemError::InvokeCancelled)),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Take the outcome if it is already available
    pub fn try_result(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Disconnected) => Some(Err(TandemError::InvokeCancelled)),
            Err(TryRecvError::Empty) => None,
        }
    }

    /// True once an outcome is waiting to be taken
    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty()
    }
}

impl<T> InvokeCompleter<T> {
    pub(crate) fn complete(self, outcome: Result<T>) {
        // The handle may already be gone; nobody is waiting then.
        let _ = self.sender.send(outcome);
    }
}
