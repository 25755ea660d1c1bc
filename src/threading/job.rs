//! One-shot background job

use std::thread::{self, JoinHandle};

use crate::error::{Result, TandemError};

/// Runs a closure on its own named thread and hands back its result
///
/// Used for blocking operations a caller wants to overlap with other work,
/// such as dialing a host.
pub struct ThreadJob<T> {
    name: String,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ThreadJob<T> {
    /// Spawn `job` immediately
    pub fn start_new<F>(name: impl Into<String>, job: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(job)?;
        Ok(Self { name, handle })
    }

    /// True until the job's closure has returned
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the job and return its value
    ///
    /// A panic inside the job is returned as `TandemError::Panicked`.
    pub fn join(self) -> Result<T> {
        self.handle.join().map_err(TandemError::from_panic)
    }
}
