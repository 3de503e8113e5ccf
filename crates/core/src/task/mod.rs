//! Conversion task queue.
//!
//! Tasks move through a four-state machine: `Queued -> Claimed ->
//! {Completed | Failed}`. The dispatcher claims the oldest queued task through
//! the store's atomic claim primitive; the claiming worker writes the terminal
//! state; the polling path deletes the record on first observation of a
//! terminal state.

mod service;
mod sqlite_store;
mod store;
mod types;

pub use service::{poll, submit, PollOutcome, SubmitRequest, DEFAULT_PITCH, DEFAULT_TEMPO};
pub use sqlite_store::SqliteTaskStore;
pub use store::{TaskStore, TaskStoreError};
pub use types::{NewTask, Task, TaskId, TaskState};
