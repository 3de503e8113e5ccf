//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::blob::BlobId;
use crate::convert::OutputFormat;
use crate::error::TaskError;

use super::store::{TaskStore, TaskStoreError};
use super::types::{NewTask, Task, TaskId, TaskState};

const TASK_COLUMNS: &str =
    "id, state, input_ref, scale_pitch, scale_tempo, output_format, result_ref, error, expire_time, owner, created_at";

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, TaskStoreError> {
        let conn = Connection::open(path).map_err(|e| TaskStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TaskStoreError::Database(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), TaskStoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                state INTEGER NOT NULL DEFAULT 0,
                input_ref TEXT NOT NULL,
                scale_pitch REAL NOT NULL,
                scale_tempo REAL NOT NULL,
                output_format TEXT NOT NULL,
                result_ref TEXT,
                error TEXT,
                expire_time TEXT NOT NULL,
                owner TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_state_id ON tasks(state, id);
            CREATE INDEX IF NOT EXISTS idx_tasks_expire_time ON tasks(expire_time);
            "#,
        )
        .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<(Task, i64)> {
        let id: TaskId = row.get(0)?;
        let state_value: i64 = row.get(1)?;
        let input_ref: String = row.get(2)?;
        let scale_pitch: f64 = row.get(3)?;
        let scale_tempo: f64 = row.get(4)?;
        let output_format_str: String = row.get(5)?;
        let result_ref: Option<String> = row.get(6)?;
        let error_json: Option<String> = row.get(7)?;
        let expire_time_str: String = row.get(8)?;
        let owner: String = row.get(9)?;
        let created_at_str: String = row.get(10)?;

        // An unknown state value is surfaced by the caller as BadState; parse
        // with Queued as a placeholder and hand the raw value back alongside.
        let state = TaskState::try_from(state_value).unwrap_or(TaskState::Queued);

        let output_format =
            OutputFormat::from_name(&output_format_str).unwrap_or(OutputFormat::Ogg);

        let error: Option<TaskError> =
            error_json.and_then(|json| serde_json::from_str(&json).ok());

        let expire_time = DateTime::parse_from_rfc3339(&expire_time_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok((
            Task {
                id,
                state,
                input_ref: BlobId::from(input_ref),
                scale_pitch,
                scale_tempo,
                output_format,
                result_ref: result_ref.map(BlobId::from),
                error,
                expire_time,
                owner,
                created_at,
            },
            state_value,
        ))
    }

    fn check_state(parsed: (Task, i64)) -> Result<Task, TaskStoreError> {
        let (task, raw_state) = parsed;
        if TaskState::try_from(raw_state).is_err() {
            return Err(TaskStoreError::BadState {
                id: task.id,
                value: raw_state,
            });
        }
        Ok(task)
    }
}

impl TaskStore for SqliteTaskStore {
    fn enqueue(&self, task: NewTask) -> Result<Task, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let now = Utc::now();

        conn.execute(
            "INSERT INTO tasks (state, input_ref, scale_pitch, scale_tempo, output_format, expire_time, owner, created_at) VALUES (0, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.input_ref.as_str(),
                task.scale_pitch,
                task.scale_tempo,
                task.output_format.name(),
                task.expire_time.to_rfc3339(),
                task.owner,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        let id = conn.last_insert_rowid();

        Ok(Task {
            id,
            state: TaskState::Queued,
            input_ref: task.input_ref,
            scale_pitch: task.scale_pitch,
            scale_tempo: task.scale_tempo,
            output_format: task.output_format,
            result_ref: None,
            error: None,
            expire_time: task.expire_time,
            owner: task.owner,
            created_at: now,
        })
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
            params![id],
            Self::row_to_task,
        );

        match result {
            Ok(parsed) => Self::check_state(parsed).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TaskStoreError::Database(e.to_string())),
        }
    }

    fn claim_oldest(&self) -> Result<Option<Task>, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        // A single statement, so SQLite's write serialization makes the claim
        // atomic across every connection sharing the database file.
        let result = conn.query_row(
            &format!(
                "UPDATE tasks SET state = 1 \
                 WHERE id = (SELECT id FROM tasks WHERE state = 0 ORDER BY id ASC LIMIT 1) \
                 RETURNING {}",
                TASK_COLUMNS
            ),
            [],
            Self::row_to_task,
        );

        match result {
            Ok(parsed) => Self::check_state(parsed).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TaskStoreError::Database(e.to_string())),
        }
    }

    fn complete(
        &self,
        id: TaskId,
        result_ref: &BlobId,
        expire_time: DateTime<Utc>,
    ) -> Result<bool, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        // Conditional on Claimed: terminal states never change again, and a
        // force-expired task is silently dropped.
        let updated = conn
            .execute(
                "UPDATE tasks SET state = 2, result_ref = ?, error = NULL, expire_time = ? \
                 WHERE id = ? AND state = 1",
                params![result_ref.as_str(), expire_time.to_rfc3339(), id],
            )
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    fn fail(
        &self,
        id: TaskId,
        error: &TaskError,
        expire_time: DateTime<Utc>,
    ) -> Result<bool, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let error_json =
            serde_json::to_string(error).map_err(|e| TaskStoreError::Database(e.to_string()))?;

        let updated = conn
            .execute(
                "UPDATE tasks SET state = 3, error = ?, result_ref = NULL, expire_time = ? \
                 WHERE id = ? AND state = 1",
                params![error_json, expire_time.to_rfc3339(), id],
            )
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    fn delete(&self, id: TaskId) -> Result<bool, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let removed = conn
            .execute("DELETE FROM tasks WHERE id = ?", params![id])
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(removed > 0)
    }

    fn queued_ahead(&self, id: TaskId) -> Result<i64, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE id < ? AND state <= 1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(count)
    }

    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        let conn = self.conn.lock().unwrap();

        let removed = conn
            .execute(
                "DELETE FROM tasks WHERE expire_time < ?",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| TaskStoreError::Database(e.to_string()))?;

        Ok(removed)
    }
}
