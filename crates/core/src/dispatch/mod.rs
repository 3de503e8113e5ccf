//! Task dispatch: the claim loop and the worker pool.
//!
//! One dispatcher per process claims the oldest queued task through the task
//! store's atomic claim primitive and pushes it onto a bounded inbound queue
//! shared by a fixed pool of workers. The bounded queue is the backpressure
//! valve: a full queue blocks further claiming rather than growing without
//! bound. Shutdown is cooperative: the claim loop stops sourcing work, pushes
//! one termination marker per worker, and the pool drains before exiting.

mod config;
mod dispatcher;
mod worker;

pub use config::DispatchConfig;
pub use dispatcher::Dispatcher;
