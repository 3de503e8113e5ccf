//! Sliding-window rate limiting.
//!
//! One bucket per (client, limit class), backed by the shared store. The
//! read-modify-write is deliberately not atomic; concurrent requests from the
//! same client can slightly over-admit, which is accepted approximate
//! limiting.

mod limiter;
mod sqlite_store;
mod store;
mod types;

pub use limiter::{RateLimitError, RateLimiter};
pub use sqlite_store::SqliteRateLimitStore;
pub use store::{RateLimitStore, RateLimitStoreError};
pub use types::RateLimitBucket;
