//! Sliding-window-log admission guard.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::metrics;

use super::store::RateLimitStore;
use super::types::RateLimitBucket;

/// Errors returned by the admission guard.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Quota exceeded; retry after the given number of seconds.
    #[error("rate limited, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: i64 },

    /// The bucket store failed.
    #[error("rate limit store error: {0}")]
    Store(String),
}

/// Guard callable before an operation, parameterized per call by
/// (key, limit, window).
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Admits or rejects one access for `client` under the given limit class.
    pub fn check(
        &self,
        client: &str,
        key: &str,
        limit: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        self.check_at(Utc::now(), client, key, limit, window)
    }

    /// Like [`RateLimiter::check`] with an explicit clock, for tests.
    ///
    /// The read-modify-write here is not atomic; concurrent requests from one
    /// client can race and slightly over-admit. A rejection never mutates the
    /// bucket.
    pub fn check_at(
        &self,
        now: DateTime<Utc>,
        client: &str,
        key: &str,
        limit: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let bucket = self
            .store
            .fetch(client, key)
            .map_err(|e| RateLimitError::Store(e.to_string()))?;

        let Some(bucket) = bucket else {
            self.store
                .upsert(&RateLimitBucket {
                    client: client.to_string(),
                    key: key.to_string(),
                    accesses: vec![now],
                    bucket_expires: now + window,
                })
                .map_err(|e| RateLimitError::Store(e.to_string()))?;
            return Ok(());
        };

        let mut accesses: Vec<DateTime<Utc>> = bucket
            .accesses
            .into_iter()
            .filter(|access| now - *access < window)
            .collect();

        if accesses.len() >= limit {
            let remaining = (bucket.bucket_expires - now).num_milliseconds();
            // Round up so the hint never undercuts the actual wait.
            let retry_after_secs = (remaining + 999) / 1000;
            metrics::RATE_LIMITED.with_label_values(&[key]).inc();
            return Err(RateLimitError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        accesses.push(now);
        self.store
            .upsert(&RateLimitBucket {
                client: client.to_string(),
                key: key.to_string(),
                accesses,
                bucket_expires: now + window,
            })
            .map_err(|e| RateLimitError::Store(e.to_string()))?;

        Ok(())
    }
}
