//! Rate limit bucket storage trait.

use chrono::{DateTime, Utc};
use std::fmt;

use super::types::RateLimitBucket;

/// Error type for rate limit store operations.
#[derive(Debug)]
pub enum RateLimitStoreError {
    /// Database error.
    Database(String),
}

impl fmt::Display for RateLimitStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitStoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for RateLimitStoreError {}

/// Trait for rate limit bucket backends.
pub trait RateLimitStore: Send + Sync {
    /// Fetches the bucket for (client, key), if present.
    fn fetch(
        &self,
        client: &str,
        key: &str,
    ) -> Result<Option<RateLimitBucket>, RateLimitStoreError>;

    /// Inserts or replaces a bucket.
    fn upsert(&self, bucket: &RateLimitBucket) -> Result<(), RateLimitStoreError>;

    /// Drops buckets whose expiry has passed. Returns the number removed.
    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RateLimitStoreError>;
}
