//! Timer Module
//!
//! Elapsed-time measurement used by the scheduler and by connection liveness.
//!
//! ## Components
//! - `SimpleTimer`: a stopwatch whose elapsed time can start from an offset
//! - `TimeoutTimer`: a `SimpleTimer` with a deadline and remaining-time queries
//! - `ByteTally`: a running total with a per-second rate

mod simple;
mod timeout;
mod tally;

pub use simple::SimpleTimer;
pub use timeout::TimeoutTimer;
pub use tally::ByteTally;
