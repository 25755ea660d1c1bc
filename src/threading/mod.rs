//! Threading Module
//!
//! Execution primitives every network component runs on.
//!
//! ## Components
//! - `ThreadRun`: one dedicated worker running periodic tick callbacks and a
//!   queue of invoked work, all mutually exclusive on that worker
//! - `InvokeHandle`: awaitable outcome of work passed to `ThreadRun::invoke_func`
//! - `ThreadJob`: a one-shot background job with a joinable result

mod thread_run;
mod invoke;
mod job;

pub use thread_run::{RunState, ThreadRun, ThreadRunner};
pub use invoke::InvokeHandle;
pub use job::ThreadJob;
