//! Blob storage trait.

use chrono::{DateTime, Utc};
use std::fmt;

use super::types::{BlobId, BlobMetadata, NewBlob};

/// Error type for blob operations.
#[derive(Debug)]
pub enum BlobStoreError {
    /// Database error.
    Database(String),
}

impl fmt::Display for BlobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for BlobStoreError {}

/// Trait for blob storage backends.
pub trait BlobStore: Send + Sync {
    /// Stores a blob, returning its new id.
    fn put(&self, blob: NewBlob, data: &[u8]) -> Result<BlobId, BlobStoreError>;

    /// Fetches a blob's metadata and full payload.
    fn get(&self, id: &BlobId) -> Result<Option<(BlobMetadata, Vec<u8>)>, BlobStoreError>;

    /// Fetches a blob's metadata only.
    fn describe(&self, id: &BlobId) -> Result<Option<BlobMetadata>, BlobStoreError>;

    /// Deletes a blob and its chunks. Deleting an already-gone id is not an
    /// error; returns whether anything was removed.
    fn delete(&self, id: &BlobId) -> Result<bool, BlobStoreError>;

    /// The most recently uploaded non-pending blob ids, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<BlobId>, BlobStoreError>;

    /// Drops blob metadata rows whose expiry has passed. Chunks are left
    /// behind as orphans for the reaper's chunk sweep.
    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, BlobStoreError>;
}
