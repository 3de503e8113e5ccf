//! SQLite-backed blob store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use super::store::{BlobStore, BlobStoreError};
use super::types::{BlobId, BlobMetadata, NewBlob, CHUNK_SIZE};

/// SQLite-backed blob store.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    /// Create a new SQLite blob store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, BlobStoreError> {
        let conn = Connection::open(path).map_err(|e| BlobStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite blob store (useful for testing).
    pub fn in_memory() -> Result<Self, BlobStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BlobStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), BlobStoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                length INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                pending INTEGER NOT NULL,
                expire_time TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                upload_date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blobs_expire_time ON blobs(expire_time);
            CREATE INDEX IF NOT EXISTS idx_blobs_upload_date ON blobs(upload_date);
            CREATE INDEX IF NOT EXISTS idx_blobs_pending ON blobs(pending);

            CREATE TABLE IF NOT EXISTS blob_chunks (
                blob_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (blob_id, seq)
            );
            "#,
        )
        .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<BlobMetadata> {
        let id: String = row.get(0)?;
        let filename: String = row.get(1)?;
        let content_type: String = row.get(2)?;
        let length: u64 = row.get(3)?;
        let checksum: String = row.get(4)?;
        let pending: bool = row.get(5)?;
        let expire_time_str: String = row.get(6)?;
        let uploaded_by: String = row.get(7)?;
        let upload_date_str: String = row.get(8)?;

        let expire_time = DateTime::parse_from_rfc3339(&expire_time_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let upload_date = DateTime::parse_from_rfc3339(&upload_date_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(BlobMetadata {
            id: BlobId::from(id),
            filename,
            content_type,
            length,
            checksum,
            pending,
            expire_time,
            uploaded_by,
            upload_date,
        })
    }

    const METADATA_COLUMNS: &'static str =
        "id, filename, content_type, length, checksum, pending, expire_time, uploaded_by, upload_date";
}

impl BlobStore for SqliteBlobStore {
    fn put(&self, blob: NewBlob, data: &[u8]) -> Result<BlobId, BlobStoreError> {
        let mut conn = self.conn.lock().unwrap();

        let id = BlobId::generate();
        let checksum = format!("{:x}", Sha256::digest(data));
        let now = Utc::now();

        let tx = conn
            .transaction()
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO blobs (id, filename, content_type, length, checksum, pending, expire_time, uploaded_by, upload_date) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.as_str(),
                blob.filename,
                blob.content_type,
                data.len() as u64,
                checksum,
                blob.pending,
                blob.expire_time.to_rfc3339(),
                blob.uploaded_by,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        for (seq, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            tx.execute(
                "INSERT INTO blob_chunks (blob_id, seq, data) VALUES (?, ?, ?)",
                params![id.as_str(), seq as i64, chunk],
            )
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        Ok(id)
    }

    fn get(&self, id: &BlobId) -> Result<Option<(BlobMetadata, Vec<u8>)>, BlobStoreError> {
        let conn = self.conn.lock().unwrap();

        let metadata = conn.query_row(
            &format!("SELECT {} FROM blobs WHERE id = ?", Self::METADATA_COLUMNS),
            params![id.as_str()],
            Self::row_to_metadata,
        );

        let metadata = match metadata {
            Ok(m) => m,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(BlobStoreError::Database(e.to_string())),
        };

        let mut stmt = conn
            .prepare("SELECT data FROM blob_chunks WHERE blob_id = ? ORDER BY seq ASC")
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![id.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        let mut data = Vec::with_capacity(metadata.length as usize);
        for chunk in rows {
            let chunk = chunk.map_err(|e| BlobStoreError::Database(e.to_string()))?;
            data.extend_from_slice(&chunk);
        }

        Ok(Some((metadata, data)))
    }

    fn describe(&self, id: &BlobId) -> Result<Option<BlobMetadata>, BlobStoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM blobs WHERE id = ?", Self::METADATA_COLUMNS),
            params![id.as_str()],
            Self::row_to_metadata,
        );

        match result {
            Ok(metadata) => Ok(Some(metadata)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(BlobStoreError::Database(e.to_string())),
        }
    }

    fn delete(&self, id: &BlobId) -> Result<bool, BlobStoreError> {
        let mut conn = self.conn.lock().unwrap();

        let tx = conn
            .transaction()
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        let removed = tx
            .execute("DELETE FROM blobs WHERE id = ?", params![id.as_str()])
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;
        tx.execute(
            "DELETE FROM blob_chunks WHERE blob_id = ?",
            params![id.as_str()],
        )
        .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        Ok(removed > 0)
    }

    fn recent(&self, limit: usize) -> Result<Vec<BlobId>, BlobStoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id FROM blobs WHERE pending = 0 ORDER BY upload_date DESC LIMIT ?",
            )
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        let mut ids = Vec::new();
        for row in rows {
            let id = row.map_err(|e| BlobStoreError::Database(e.to_string()))?;
            ids.push(BlobId::from(id));
        }

        Ok(ids)
    }

    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, BlobStoreError> {
        let conn = self.conn.lock().unwrap();

        let removed = conn
            .execute(
                "DELETE FROM blobs WHERE expire_time < ?",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| BlobStoreError::Database(e.to_string()))?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_store() -> SqliteBlobStore {
        SqliteBlobStore::in_memory().unwrap()
    }

    fn new_blob(pending: bool) -> NewBlob {
        NewBlob {
            filename: "song.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            pending,
            expire_time: Utc::now() + Duration::days(1),
            uploaded_by: "127.0.0.1".to_string(),
        }
    }

    fn chunk_count(store: &SqliteBlobStore) -> i64 {
        let conn = store.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM blob_chunks", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = create_test_store();
        let data = vec![42u8; 1000];

        let id = store.put(new_blob(true), &data).unwrap();
        let (metadata, fetched) = store.get(&id).unwrap().unwrap();

        assert_eq!(fetched, data);
        assert_eq!(metadata.length, 1000);
        assert_eq!(metadata.filename, "song.mp3");
        assert!(metadata.pending);
        assert_eq!(metadata.checksum.len(), 64);
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        let store = create_test_store();
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 123)).map(|i| (i % 251) as u8).collect();

        let id = store.put(new_blob(false), &data).unwrap();
        assert_eq!(chunk_count(&store), 3);

        let (metadata, fetched) = store.get(&id).unwrap().unwrap();
        assert_eq!(fetched, data);
        assert_eq!(metadata.length as usize, data.len());
    }

    #[test]
    fn test_get_missing() {
        let store = create_test_store();
        assert!(store.get(&BlobId::generate()).unwrap().is_none());
        assert!(store.describe(&BlobId::generate()).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_chunks_and_is_idempotent() {
        let store = create_test_store();
        let data = vec![1u8; CHUNK_SIZE + 1];

        let id = store.put(new_blob(true), &data).unwrap();
        assert_eq!(chunk_count(&store), 2);

        assert!(store.delete(&id).unwrap());
        assert_eq!(chunk_count(&store), 0);
        assert!(store.get(&id).unwrap().is_none());

        // Deleting again is not an error.
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn test_recent_excludes_pending() {
        let store = create_test_store();

        store.put(new_blob(true), b"pending").unwrap();
        let done1 = store.put(new_blob(false), b"done1").unwrap();
        let done2 = store.put(new_blob(false), b"done2").unwrap();

        let recents = store.recent(10).unwrap();
        assert_eq!(recents.len(), 2);
        assert!(recents.contains(&done1));
        assert!(recents.contains(&done2));

        let recents = store.recent(1).unwrap();
        assert_eq!(recents.len(), 1);
    }

    #[test]
    fn test_expire_before_leaves_chunks() {
        let store = create_test_store();

        let mut blob = new_blob(false);
        blob.expire_time = Utc::now() - Duration::hours(1);
        let expired = store.put(blob, &vec![0u8; 100]).unwrap();

        let kept = store.put(new_blob(false), &vec![0u8; 100]).unwrap();

        let removed = store.expire_before(Utc::now()).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&expired).unwrap().is_none());
        assert!(store.get(&kept).unwrap().is_some());

        // The expired blob's chunks stay behind for the reaper.
        assert_eq!(chunk_count(&store), 2);
    }
}
