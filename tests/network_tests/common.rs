//! Shared helpers for the network tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tandem::demo;
use tandem::protocol::GroupTable;
use tandem::timer::TimeoutTimer;
use tandem::NetConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Route library logs to the test harness; later calls are no-ops
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tandem=debug"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

pub fn demo_group() -> Arc<GroupTable> {
    demo::registry().unwrap().group(demo::GROUP).unwrap()
}

/// Short intervals so tests do not sit idle
pub fn fast_config() -> NetConfig {
    NetConfig::builder()
        .host_tick_interval(Duration::from_millis(10))
        .udp_poll_interval(Duration::from_millis(5))
        .handshake_timeout(Duration::from_secs(2))
        .handshake_window(Duration::from_secs(2))
        .token_resend_interval(Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(2))
        .build()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = TimeoutTimer::start_new(timeout);
    while !deadline.is_timed_out() {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Poll `source` until it yields a value or `timeout` passes
pub fn poll_for<T, F: FnMut() -> Option<T>>(timeout: Duration, mut source: F) -> Option<T> {
    let deadline = TimeoutTimer::start_new(timeout);
    while !deadline.is_timed_out() {
        if let Some(value) = source() {
            return Some(value);
        }
        thread::sleep(Duration::from_millis(5));
    }
    source()
}
