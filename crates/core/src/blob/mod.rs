//! Content store for uploaded audio and conversion results.
//!
//! Blobs are stored as a metadata row plus fixed-size chunks so the reaper can
//! reclaim chunk storage independently of the metadata rows the TTL sweep
//! removes.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteBlobStore;
pub use store::{BlobStore, BlobStoreError};
pub use types::{BlobId, BlobMetadata, NewBlob, CHUNK_SIZE};
