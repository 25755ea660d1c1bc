//! ThreadRun
//!
//! A dedicated worker thread that runs periodic tick callbacks and a queue of
//! invoked work items against a single owned runner value.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::Span;

use crate::error::{Result, TandemError};
use crate::timer::TimeoutTimer;

use super::invoke::InvokeHandle;

/// Longest wait between passes when no tick is registered
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Hooks run on the worker thread around the tick loop
///
/// The runner is moved onto the worker at `start`; tick callbacks and
/// invoked work receive `&mut` access to it, so none of them need locking
/// against each other.
pub trait ThreadRunner: Send + 'static {
    /// Called once on the worker before the first tick
    fn on_begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called exactly once on the worker before it exits
    ///
    /// `unhandled` carries the error that stopped the worker, if any.
    fn on_finish(&mut self, unhandled: Option<&TandemError>) {
        let _ = unhandled;
    }
}

/// Lifecycle of a `ThreadRun`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

type TickFn<R> = Box<dyn FnMut(&mut R) -> Result<()> + Send>;
type WorkItem<R> = Box<dyn FnOnce(&mut R) -> Result<()> + Send>;

struct TickCall<R> {
    callback: TickFn<R>,
    period: Duration,
    timer: TimeoutTimer,
}

/// Runner and registrations waiting for `start`
struct Pending<R> {
    runner: R,
    ticks: Vec<TickCall<R>>,
}

/// Invoked work waiting for the worker
struct WorkQueue<R> {
    items: VecDeque<WorkItem<R>>,

    /// Set once the worker will never drain the queue again
    closed: bool,
}

impl<R> WorkQueue<R> {
    /// Refuse further work and drop what is queued
    fn close(&mut self) {
        self.closed = true;
        self.items.clear();
    }
}

/// State shared between the owner handle and the worker
struct Shared<R> {
    name: String,
    state: Mutex<RunState>,
    state_changed: Condvar,
    stop_requested: AtomicBool,
    queue: Mutex<WorkQueue<R>>,
    queue_signal: Condvar,
    worker_thread: Mutex<Option<ThreadId>>,
    unhandled_error: Mutex<Option<String>>,
    span: Span,
}

impl<R> Shared<R> {
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let _queue = self.queue.lock();
        self.queue_signal.notify_all();
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock();
        *state = next;
        self.state_changed.notify_all();
    }
}

/// A named worker thread driving a `ThreadRunner`
///
/// ## Usage
/// 1. `ThreadRun::new(name, runner)`
/// 2. `register_tick_call` any number of times
/// 3. `start()`, then `invoke` / `invoke_func` from any thread
/// 4. `stop(blocking)`
///
/// An error or panic in `on_begin`, a tick callback, or invoked work stops
/// the worker and is handed to `on_finish`.
pub struct ThreadRun<R: ThreadRunner> {
    shared: Arc<Shared<R>>,
    pending: Mutex<Option<Pending<R>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ThreadRunner> ThreadRun<R> {
    /// Create a stopped scheduler owning `runner`
    pub fn new(name: impl Into<String>, runner: R) -> Result<Self> {
        Self::with_parent(name, runner, &Span::current())
    }

    /// Create a scheduler whose log span is a child of `parent`
    pub fn with_parent(name: impl Into<String>, runner: R, parent: &Span) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TandemError::Scheduler(
                "thread name cannot be empty".to_string(),
            ));
        }

        let span = tracing::debug_span!(parent: parent, "thread_run", name = %name);

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(RunState::NotStarted),
                state_changed: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                queue: Mutex::new(WorkQueue {
                    items: VecDeque::new(),
                    closed: false,
                }),
                queue_signal: Condvar::new(),
                worker_thread: Mutex::new(None),
                unhandled_error: Mutex::new(None),
                span,
            }),
            pending: Mutex::new(Some(Pending {
                runner,
                ticks: Vec::new(),
            })),
            handle: Mutex::new(None),
        })
    }

    /// Register `callback` to run every `period` on the worker
    ///
    /// Only valid before `start`. Callbacks run in registration order.
    pub fn register_tick_call<F>(&self, period: Duration, callback: F) -> Result<()>
    where
        F: FnMut(&mut R) -> Result<()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(TandemError::Scheduler(format!(
                "tick period for '{}' must be greater than zero",
                self.shared.name
            )));
        }

        let mut pending = self.pending.lock();
        let pending = pending.as_mut().ok_or_else(|| {
            TandemError::Scheduler(format!(
                "cannot register tick calls on '{}' after start",
                self.shared.name
            ))
        })?;

        // A fresh registration is due on the first pass.
        pending.ticks.push(TickCall {
            callback: Box::new(callback),
            period,
            timer: TimeoutTimer::start_new(Duration::ZERO),
        });

        Ok(())
    }

    /// Spawn the worker thread
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != RunState::NotStarted {
            return Err(TandemError::Scheduler(format!(
                "'{}' has already been started",
                self.shared.name
            )));
        }

        let pending = self.pending.lock().take().ok_or_else(|| {
            TandemError::Scheduler(format!("'{}' has already been started", self.shared.name))
        })?;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("<{}>", self.shared.name))
            .spawn(move || run_worker(shared, pending))?;

        *state = RunState::Running;
        self.shared.state_changed.notify_all();
        drop(state);

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Request the worker to exit
    ///
    /// Idempotent. With `blocking`, waits until `on_finish` has completed,
    /// unless called from the worker itself.
    pub fn stop(&self, blocking: bool) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                RunState::NotStarted => {
                    // Never ran: no hooks to call.
                    self.pending.lock().take();
                    self.shared.queue.lock().close();
                    *state = RunState::Stopped;
                    self.shared.state_changed.notify_all();
                    return;
                }
                RunState::Running => {
                    *state = RunState::Stopping;
                    self.shared.state_changed.notify_all();
                }
                RunState::Stopping | RunState::Stopped => {}
            }
        }

        self.shared.request_stop();

        if blocking && !self.is_current_thread() {
            let mut state = self.shared.state.lock();
            while *state != RunState::Stopped {
                self.shared.state_changed.wait(&mut state);
            }
            drop(state);

            if let Some(handle) = self.handle.lock().take() {
                let _ = handle.join();
            }
        }
    }

    /// Queue work to run on the worker during its next pass
    ///
    /// An error returned by `work` stops the worker. Work queued once the
    /// worker has stopped is dropped without running.
    pub fn invoke<F>(&self, work: F)
    where
        F: FnOnce(&mut R) -> Result<()> + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.closed {
            tracing::debug!(parent: &self.shared.span, "dropping work invoked after stop");
            return;
        }

        queue.items.push_back(Box::new(work));
        self.shared.queue_signal.notify_one();
    }

    /// Queue work whose outcome is captured in the returned handle
    ///
    /// Errors and panics from `work` are delivered through the handle and do
    /// not stop the worker.
    pub fn invoke_func<T, F>(&self, work: F) -> InvokeHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> Result<T> + Send + 'static,
    {
        let (handle, completer) = InvokeHandle::pair();
        self.invoke(move |runner| {
            completer.complete(guarded(|| work(runner)));
            Ok(())
        });
        handle
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.lock()
    }

    pub fn has_started(&self) -> bool {
        self.state() != RunState::NotStarted
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    /// True when called from this scheduler's worker thread
    pub fn is_current_thread(&self) -> bool {
        *self.shared.worker_thread.lock() == Some(thread::current().id())
    }

    /// Message of the error that stopped the worker, if any
    pub fn unhandled_error(&self) -> Option<String> {
        self.shared.unhandled_error.lock().clone()
    }

    /// Span used for this scheduler's log events
    pub fn span(&self) -> &Span {
        &self.shared.span
    }
}

impl<R: ThreadRunner> Drop for ThreadRun<R> {
    fn drop(&mut self) {
        self.stop(true);
    }
}

/// Run `f`, turning a panic into `TandemError::Panicked`
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TandemError::from_panic(payload)),
    }
}

/// Worker thread body
fn run_worker<R: ThreadRunner>(shared: Arc<Shared<R>>, pending: Pending<R>) {
    *shared.worker_thread.lock() = Some(thread::current().id());
    let _enter = shared.span.enter();

    let Pending { mut runner, mut ticks } = pending;

    let mut unhandled = guarded(|| runner.on_begin()).err();
    if unhandled.is_none() {
        tracing::debug!("began");
        unhandled = tick_loop(&shared, &mut runner, &mut ticks).err();
    }

    if let Some(ref error) = unhandled {
        tracing::error!("error while running: {}", error);
        shared.request_stop();
        let mut state = shared.state.lock();
        if *state == RunState::Running {
            *state = RunState::Stopping;
            shared.state_changed.notify_all();
        }
    }

    if let Err(error) = guarded(|| {
        runner.on_finish(unhandled.as_ref());
        Ok(())
    }) {
        tracing::error!("on_finish failed: {}", error);
    }

    // Dropping queued work cancels any handles still waiting on it.
    shared.queue.lock().close();
    *shared.unhandled_error.lock() = unhandled.map(|e| e.to_string());

    tracing::debug!("finished");
    shared.set_state(RunState::Stopped);
}

/// Tick / drain / sleep until a stop is requested
fn tick_loop<R: ThreadRunner>(
    shared: &Shared<R>,
    runner: &mut R,
    ticks: &mut [TickCall<R>],
) -> Result<()> {
    while !shared.stop_requested() {
        let mut next_pass = IDLE_WAIT;

        for call in ticks.iter_mut() {
            if call.timer.is_timed_out() {
                guarded(|| (call.callback)(runner))?;
                call.timer.restart_with_timeout(call.period);
            }
            next_pass = next_pass.min(call.timer.remaining());
        }

        loop {
            if shared.stop_requested() {
                break;
            }
            let work = shared.queue.lock().items.pop_front();
            match work {
                Some(work) => guarded(|| work(runner))?,
                None => break,
            }
        }

        let mut queue = shared.queue.lock();
        if queue.items.is_empty() && !shared.stop_requested() && !next_pass.is_zero() {
            shared.queue_signal.wait_for(&mut queue, next_pass);
        }
    }

    Ok(())
}
