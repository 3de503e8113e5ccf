//! Rate limit bucket types.

use chrono::{DateTime, Utc};

/// One client's access log for a single limit class.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitBucket {
    /// Client identity (source address).
    pub client: String,
    /// Limit class name, e.g. "do_conversion".
    pub key: String,
    /// Timestamps of admitted accesses within the current window.
    pub accesses: Vec<DateTime<Utc>>,
    /// When the bucket may be dropped by the expiry sweep.
    pub bucket_expires: DateTime<Utc>,
}
