//! ThreadRun Tests
//!
//! Tests verify:
//! - Construction and registration errors
//! - Tick cadence and registration order
//! - Blocking and re-entrant stop
//! - Failure capture into on_finish
//! - invoke / invoke_func semantics
//! - ThreadJob results and panics

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tandem::threading::{RunState, ThreadJob, ThreadRun, ThreadRunner};
use tandem::timer::SimpleTimer;
use tandem::TandemError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Runner recording its hooks into shared state the test can inspect
#[derive(Default)]
struct Probe {
    began: Arc<AtomicBool>,
    finished: Arc<AtomicUsize>,
    finish_error: Arc<Mutex<Option<String>>>,
    log: Arc<Mutex<Vec<&'static str>>>,
    ticks: usize,
}

impl ThreadRunner for Probe {
    fn on_begin(&mut self) -> tandem::Result<()> {
        self.began.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_finish(&mut self, unhandled: Option<&TandemError>) {
        *self.finish_error.lock() = unhandled.map(|e| e.to_string());
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runner whose on_begin fails
struct FailingBegin {
    finish_error: Arc<Mutex<Option<String>>>,
}

impl ThreadRunner for FailingBegin {
    fn on_begin(&mut self) -> tandem::Result<()> {
        Err(TandemError::Scheduler("socket unavailable".to_string()))
    }

    fn on_finish(&mut self, unhandled: Option<&TandemError>) {
        *self.finish_error.lock() = unhandled.map(|e| e.to_string());
    }
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let timer = SimpleTimer::start_new();
    while timer.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_empty_name_is_rejected() {
    let result = ThreadRun::new("  ", Probe::default());
    assert!(matches!(result, Err(TandemError::Scheduler(_))));
}

#[test]
fn test_new_run_is_not_started() {
    let run = ThreadRun::new("worker", Probe::default()).unwrap();
    assert_eq!(run.name(), "worker");
    assert_eq!(run.state(), RunState::NotStarted);
    assert!(!run.has_started());
    assert!(!run.is_stopped());
    assert!(!run.is_current_thread());
}

#[test]
fn test_zero_tick_period_is_rejected() {
    let run = ThreadRun::new("worker", Probe::default()).unwrap();
    let result = run.register_tick_call(Duration::ZERO, |_| Ok(()));
    assert!(matches!(result, Err(TandemError::Scheduler(_))));
}

#[test]
fn test_register_after_start_is_rejected() {
    let run = ThreadRun::new("worker", Probe::default()).unwrap();
    run.start().unwrap();

    let result = run.register_tick_call(Duration::from_millis(10), |_| Ok(()));
    assert!(matches!(result, Err(TandemError::Scheduler(_))));

    run.stop(true);
}

#[test]
fn test_start_twice_is_rejected() {
    let run = ThreadRun::new("worker", Probe::default()).unwrap();
    run.start().unwrap();
    assert!(matches!(run.start(), Err(TandemError::Scheduler(_))));
    run.stop(true);
}

// =============================================================================
// Tick Tests
// =============================================================================

#[test]
fn test_tick_fires_at_expected_rate() {
    let count = Arc::new(AtomicUsize::new(0));
    let run = ThreadRun::new("ticker", Probe::default()).unwrap();

    let counter = Arc::clone(&count);
    run.register_tick_call(Duration::from_millis(20), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    run.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    run.stop(true);

    // floor(300 / 20) - 1
    let fired = count.load(Ordering::SeqCst);
    assert!(fired >= 14, "tick fired only {} times", fired);
}

#[test]
fn test_ticks_run_in_registration_order() {
    let probe = Probe::default();
    let log = Arc::clone(&probe.log);
    let run = ThreadRun::new("ordered", probe).unwrap();

    run.register_tick_call(Duration::from_secs(60), |probe| {
        probe.log.lock().push("first");
        Ok(())
    })
    .unwrap();
    run.register_tick_call(Duration::from_secs(60), |probe| {
        probe.log.lock().push("second");
        Ok(())
    })
    .unwrap();

    run.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || log.lock().len() == 2));
    run.stop(true);

    assert_eq!(*log.lock(), vec!["first", "second"]);
}

#[test]
fn test_tick_callbacks_share_runner_state() {
    let run = ThreadRun::new("stateful", Probe::default()).unwrap();
    run.register_tick_call(Duration::from_millis(5), |probe| {
        probe.ticks += 1;
        Ok(())
    })
    .unwrap();
    run.start().unwrap();

    thread::sleep(Duration::from_millis(50));
    let ticks = run.invoke_func(|probe| Ok(probe.ticks)).wait().unwrap();
    assert!(ticks >= 2);

    run.stop(true);
}

// =============================================================================
// Stop Tests
// =============================================================================

#[test]
fn test_blocking_stop_waits_for_on_finish() {
    let probe = Probe::default();
    let began = Arc::clone(&probe.began);
    let finished = Arc::clone(&probe.finished);

    let run = ThreadRun::new("blocking", probe).unwrap();
    run.register_tick_call(Duration::from_millis(10), |_| Ok(())).unwrap();
    run.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || began.load(Ordering::SeqCst)));

    run.stop(true);

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(run.state(), RunState::Stopped);
    assert!(run.is_stopped());
}

#[test]
fn test_stop_is_idempotent() {
    let probe = Probe::default();
    let finished = Arc::clone(&probe.finished);

    let run = ThreadRun::new("twice", probe).unwrap();
    run.start().unwrap();
    run.stop(true);
    run.stop(true);
    run.stop(false);

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_from_worker_does_not_deadlock() {
    let probe = Probe::default();
    let finished = Arc::clone(&probe.finished);

    let run = Arc::new(ThreadRun::new("self-stopping", probe).unwrap());
    let handle = Arc::clone(&run);
    run.register_tick_call(Duration::from_millis(10), move |_| {
        assert!(handle.is_current_thread());
        handle.stop(true);
        Ok(())
    })
    .unwrap();
    run.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || run.is_stopped()));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(run.unhandled_error().is_none());
}

#[test]
fn test_stop_before_start_skips_hooks() {
    let probe = Probe::default();
    let began = Arc::clone(&probe.began);
    let finished = Arc::clone(&probe.finished);

    let run = ThreadRun::new("never", probe).unwrap();
    run.stop(true);

    assert!(run.is_stopped());
    assert!(!began.load(Ordering::SeqCst));
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(run.start().is_err());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_tick_error_stops_run_and_reaches_on_finish() {
    let probe = Probe::default();
    let finish_error = Arc::clone(&probe.finish_error);

    let run = ThreadRun::new("failing", probe).unwrap();
    run.register_tick_call(Duration::from_millis(5), |_| {
        Err(TandemError::Transport("tick exploded".to_string()))
    })
    .unwrap();
    run.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || run.is_stopped()));
    let reported = finish_error.lock().clone().unwrap();
    assert!(reported.contains("tick exploded"));
    assert!(run.unhandled_error().unwrap().contains("tick exploded"));
}

#[test]
fn test_tick_panic_is_captured() {
    let probe = Probe::default();
    let finish_error = Arc::clone(&probe.finish_error);

    let run = ThreadRun::new("panicking", probe).unwrap();
    run.register_tick_call(Duration::from_millis(5), |_| panic!("boom")).unwrap();
    run.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || run.is_stopped()));
    assert!(finish_error.lock().clone().unwrap().contains("boom"));
}

#[test]
fn test_on_begin_error_skips_ticks() {
    let finish_error = Arc::new(Mutex::new(None));
    let ticked = Arc::new(AtomicBool::new(false));

    let run = ThreadRun::new(
        "bad-begin",
        FailingBegin {
            finish_error: Arc::clone(&finish_error),
        },
    )
    .unwrap();
    let flag = Arc::clone(&ticked);
    run.register_tick_call(Duration::from_millis(5), move |_| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    run.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || run.is_stopped()));
    assert!(!ticked.load(Ordering::SeqCst));
    assert!(finish_error.lock().clone().unwrap().contains("socket unavailable"));
}

#[test]
fn test_invoke_error_stops_run() {
    let run = ThreadRun::new("invoke-error", Probe::default()).unwrap();
    run.start().unwrap();

    run.invoke(|_| Err(TandemError::Transport("bad work".to_string())));

    assert!(wait_until(Duration::from_secs(2), || run.is_stopped()));
    assert!(run.unhandled_error().unwrap().contains("bad work"));
}

// =============================================================================
// Invoke Tests
// =============================================================================

#[test]
fn test_invoked_work_runs_in_order_on_worker() {
    let probe = Probe::default();
    let log = Arc::clone(&probe.log);

    let run = Arc::new(ThreadRun::new("invoker", probe).unwrap());
    run.start().unwrap();

    for label in ["a", "b", "c"] {
        let handle = Arc::clone(&run);
        run.invoke(move |probe| {
            assert!(handle.is_current_thread());
            probe.log.lock().push(label);
            Ok(())
        });
    }

    assert!(wait_until(Duration::from_secs(2), || log.lock().len() == 3));
    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    run.stop(true);
}

#[test]
fn test_invoke_func_returns_value() {
    let run = ThreadRun::new("func", Probe::default()).unwrap();
    run.start().unwrap();

    let handle = run.invoke_func(|_| Ok(21 * 2));
    assert_eq!(handle.wait().unwrap(), 42);

    run.stop(true);
}

#[test]
fn test_invoke_func_error_does_not_stop_run() {
    let run = ThreadRun::new("func-error", Probe::default()).unwrap();
    run.start().unwrap();

    let failed = run.invoke_func::<(), _>(|_| Err(TandemError::Transport("nope".to_string())));
    assert!(matches!(failed.wait(), Err(TandemError::Transport(_))));

    let panicked = run.invoke_func::<(), _>(|_| panic!("inside func"));
    assert!(matches!(panicked.wait(), Err(TandemError::Panicked(_))));

    assert_eq!(run.state(), RunState::Running);
    assert_eq!(run.invoke_func(|_| Ok("still alive")).wait().unwrap(), "still alive");

    run.stop(true);
}

#[test]
fn test_invoke_func_before_start_runs_after_start() {
    let run = ThreadRun::new("queued", Probe::default()).unwrap();
    let handle = run.invoke_func(|_| Ok(7));

    thread::sleep(Duration::from_millis(20));
    assert!(!handle.is_ready());

    run.start().unwrap();
    assert_eq!(handle.wait_timeout(Duration::from_secs(2)).ok().unwrap().unwrap(), 7);
    run.stop(true);
}

#[test]
fn test_invoke_after_stop_is_cancelled() {
    let run = ThreadRun::new("stopped", Probe::default()).unwrap();
    run.start().unwrap();
    run.stop(true);

    let handle = run.invoke_func(|_| Ok(1));
    assert!(matches!(handle.wait(), Err(TandemError::InvokeCancelled)));
}

#[test]
fn test_wait_timeout_hands_back_pending_handle() {
    let run = ThreadRun::new("slow", Probe::default()).unwrap();
    run.start().unwrap();

    let handle = run.invoke_func(|_| {
        thread::sleep(Duration::from_millis(100));
        Ok(5)
    });
    let handle = match handle.wait_timeout(Duration::from_millis(1)) {
        Err(pending) => pending,
        Ok(_) => panic!("work finished implausibly fast"),
    };
    assert!(handle.try_result().is_none());
    assert_eq!(handle.wait().unwrap(), 5);

    run.stop(true);
}

// =============================================================================
// ThreadJob Tests
// =============================================================================

#[test]
fn test_job_returns_value() {
    let job = ThreadJob::start_new("adder", || 2 + 3).unwrap();
    assert_eq!(job.name(), "adder");
    assert_eq!(job.join().unwrap(), 5);
}

#[test]
fn test_job_reports_running() {
    let release = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&release);
    let job = ThreadJob::start_new("waiter", move || {
        while !flag.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
    })
    .unwrap();

    assert!(job.is_running());
    release.store(true, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(2), || !job.is_running()));
    job.join().unwrap();
}

#[test]
fn test_job_panic_becomes_error() {
    let job = ThreadJob::start_new("doomed", || -> u32 { panic!("job failed") }).unwrap();
    match job.join() {
        Err(TandemError::Panicked(message)) => assert!(message.contains("job failed")),
        other => panic!("expected Panicked, got {:?}", other.map(|_| ())),
    }
}
