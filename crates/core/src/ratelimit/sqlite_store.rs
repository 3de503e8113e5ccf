//! SQLite-backed rate limit store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::store::{RateLimitStore, RateLimitStoreError};
use super::types::RateLimitBucket;

/// SQLite-backed rate limit store.
pub struct SqliteRateLimitStore {
    conn: Mutex<Connection>,
}

impl SqliteRateLimitStore {
    /// Create a new SQLite rate limit store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, RateLimitStoreError> {
        let conn =
            Connection::open(path).map_err(|e| RateLimitStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite rate limit store (useful for testing).
    pub fn in_memory() -> Result<Self, RateLimitStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), RateLimitStoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ratelimits (
                client TEXT NOT NULL,
                key TEXT NOT NULL,
                accesses TEXT NOT NULL,
                bucket_expires TEXT NOT NULL,
                PRIMARY KEY (client, key)
            );

            CREATE INDEX IF NOT EXISTS idx_ratelimits_expires ON ratelimits(bucket_expires);
            "#,
        )
        .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;

        Ok(())
    }
}

impl RateLimitStore for SqliteRateLimitStore {
    fn fetch(
        &self,
        client: &str,
        key: &str,
    ) -> Result<Option<RateLimitBucket>, RateLimitStoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT accesses, bucket_expires FROM ratelimits WHERE client = ? AND key = ?",
            params![client, key],
            |row| {
                let accesses_json: String = row.get(0)?;
                let expires_str: String = row.get(1)?;
                Ok((accesses_json, expires_str))
            },
        );

        let (accesses_json, expires_str) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(RateLimitStoreError::Database(e.to_string())),
        };

        let accesses: Vec<DateTime<Utc>> =
            serde_json::from_str(&accesses_json).unwrap_or_default();
        let bucket_expires = DateTime::parse_from_rfc3339(&expires_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(RateLimitBucket {
            client: client.to_string(),
            key: key.to_string(),
            accesses,
            bucket_expires,
        }))
    }

    fn upsert(&self, bucket: &RateLimitBucket) -> Result<(), RateLimitStoreError> {
        let conn = self.conn.lock().unwrap();

        let accesses_json = serde_json::to_string(&bucket.accesses)
            .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO ratelimits (client, key, accesses, bucket_expires) VALUES (?, ?, ?, ?) \
             ON CONFLICT(client, key) DO UPDATE SET accesses = excluded.accesses, bucket_expires = excluded.bucket_expires",
            params![
                bucket.client,
                bucket.key,
                accesses_json,
                bucket.bucket_expires.to_rfc3339(),
            ],
        )
        .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RateLimitStoreError> {
        let conn = self.conn.lock().unwrap();

        let removed = conn
            .execute(
                "DELETE FROM ratelimits WHERE bucket_expires < ?",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| RateLimitStoreError::Database(e.to_string()))?;

        Ok(removed)
    }
}
