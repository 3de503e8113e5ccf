//! Blob types and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk size for stored blob data, in bytes.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Opaque identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata carried by every stored blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub id: BlobId,
    pub filename: String,
    pub content_type: String,
    /// Total payload length in bytes.
    pub length: u64,
    /// sha256 of the payload, hex-encoded.
    pub checksum: String,
    /// True while the blob is an input waiting for conversion. Pending blobs
    /// are never served to clients.
    pub pending: bool,
    pub expire_time: DateTime<Utc>,
    pub uploaded_by: String,
    pub upload_date: DateTime<Utc>,
}

/// Payload-independent fields for storing a new blob.
#[derive(Debug, Clone)]
pub struct NewBlob {
    pub filename: String,
    pub content_type: String,
    pub pending: bool,
    pub expire_time: DateTime<Utc>,
    pub uploaded_by: String,
}
