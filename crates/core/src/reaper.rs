//! Background reclamation of expired and orphaned storage.
//!
//! The reaper runs one jittered loop per process. Each cycle force-expires
//! records whose TTL has passed (tasks, blob metadata, rate-limit buckets),
//! then reclaims orphans: pending blobs no task references any more, and
//! chunks whose blob row is gone. Every step is best-effort and idempotent;
//! re-deleting an already-gone id is not an error, and one failing step never
//! stops the others.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::metrics;
use crate::ratelimit::RateLimitStore;
use crate::task::TaskStore;

/// Configuration for the reaper loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Base sweep period in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Random jitter added to each period, in seconds, so multiple processes
    /// do not sweep in lockstep.
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,

    /// Maximum ids per delete statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_interval() -> u64 {
    30
}

fn default_jitter() -> u64 {
    5
}

fn default_batch_size() -> usize {
    50
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            batch_size: default_batch_size(),
        }
    }
}

/// Error type for reaper construction.
#[derive(Debug)]
pub struct ReaperError(String);

impl std::fmt::Display for ReaperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reaper error: {}", self.0)
    }
}

impl std::error::Error for ReaperError {}

/// Periodic background sweep reclaiming expired and orphaned storage.
pub struct Reaper {
    config: ReaperConfig,
    conn: Arc<Mutex<Connection>>,
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    ratelimits: Arc<dyn RateLimitStore>,

    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Reaper {
    /// Create a new reaper with its own connection to the shared database.
    pub fn new(
        config: ReaperConfig,
        db_path: &Path,
        tasks: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        ratelimits: Arc<dyn RateLimitStore>,
    ) -> Result<Self, ReaperError> {
        let conn = Connection::open(db_path).map_err(|e| ReaperError(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ReaperError(e.to_string()))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
            tasks,
            blobs,
            ratelimits,
            running: AtomicBool::new(false),
            shutdown_tx,
            handle: AsyncMutex::new(None),
        })
    }

    /// Start the sweep loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reaper already running");
            return;
        }

        let config = self.config.clone();
        let conn = Arc::clone(&self.conn);
        let tasks = Arc::clone(&self.tasks);
        let blobs = Arc::clone(&self.blobs);
        let ratelimits = Arc::clone(&self.ratelimits);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Reaper loop started");
            loop {
                let delay = Duration::from_secs(
                    config.interval_secs + rand::thread_rng().gen_range(0..=config.jitter_secs),
                );

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {
                        run_sweep(&config, &conn, tasks.as_ref(), blobs.as_ref(), ratelimits.as_ref());
                    }
                }
            }
            info!("Reaper loop stopped");
        });

        *self.handle.lock().await = Some(handle);
    }

    /// Stop the sweep loop.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Reaper not running");
            return;
        }

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Run a single sweep cycle immediately. Exposed for tests and manual
    /// maintenance.
    pub fn sweep_once(&self) {
        run_sweep(
            &self.config,
            &self.conn,
            self.tasks.as_ref(),
            self.blobs.as_ref(),
            self.ratelimits.as_ref(),
        );
    }
}

/// One full sweep cycle. Each step is independently fault-isolated.
fn run_sweep(
    config: &ReaperConfig,
    conn: &Arc<Mutex<Connection>>,
    tasks: &dyn TaskStore,
    blobs: &dyn BlobStore,
    ratelimits: &dyn RateLimitStore,
) {
    let now = chrono::Utc::now();

    match tasks.expire_before(now) {
        Ok(n) if n > 0 => {
            debug!("Force-expired {} tasks", n);
            metrics::REAPER_DELETED.with_label_values(&["task"]).inc_by(n as u64);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Task expiry sweep failed: {}", e);
            metrics::LOOP_ERRORS.with_label_values(&["reaper"]).inc();
        }
    }

    match blobs.expire_before(now) {
        Ok(n) if n > 0 => {
            debug!("Expired {} blobs", n);
            metrics::REAPER_DELETED.with_label_values(&["blob"]).inc_by(n as u64);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Blob expiry sweep failed: {}", e);
            metrics::LOOP_ERRORS.with_label_values(&["reaper"]).inc();
        }
    }

    match ratelimits.expire_before(now) {
        Ok(n) if n > 0 => {
            debug!("Expired {} rate limit buckets", n);
            metrics::REAPER_DELETED.with_label_values(&["bucket"]).inc_by(n as u64);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Rate limit expiry sweep failed: {}", e);
            metrics::LOOP_ERRORS.with_label_values(&["reaper"]).inc();
        }
    }

    if let Err(e) = reap_orphans(config, conn) {
        error!("Orphan sweep failed: {}", e);
        metrics::LOOP_ERRORS.with_label_values(&["reaper"]).inc();
    }
}

/// Reclaims pending blobs no task references, then chunks whose blob row is
/// gone. Orphans of the first pass are picked up by the second in the same
/// cycle.
fn reap_orphans(config: &ReaperConfig, conn: &Arc<Mutex<Connection>>) -> Result<(), ReaperError> {
    let conn = conn.lock().unwrap();

    let orphan_blobs = collect_ids(
        &conn,
        "SELECT b.id FROM blobs b \
         WHERE b.pending = 1 \
         AND NOT EXISTS (SELECT 1 FROM tasks t WHERE t.input_ref = b.id)",
    )?;

    if !orphan_blobs.is_empty() {
        let deleted = batch_delete(&conn, "blobs", "id", &orphan_blobs, config.batch_size)?;
        debug!("Reaped {} orphaned pending blobs", deleted);
        metrics::REAPER_DELETED
            .with_label_values(&["orphan_blob"])
            .inc_by(deleted as u64);
    }

    let orphan_chunks = collect_ids(
        &conn,
        "SELECT DISTINCT c.blob_id FROM blob_chunks c \
         WHERE NOT EXISTS (SELECT 1 FROM blobs b WHERE b.id = c.blob_id)",
    )?;

    if !orphan_chunks.is_empty() {
        let deleted = batch_delete(
            &conn,
            "blob_chunks",
            "blob_id",
            &orphan_chunks,
            config.batch_size,
        )?;
        debug!("Reaped chunks of {} orphaned blobs", orphan_chunks.len());
        metrics::REAPER_DELETED
            .with_label_values(&["orphan_chunk"])
            .inc_by(deleted as u64);
    }

    Ok(())
}

fn collect_ids(conn: &Connection, sql: &str) -> Result<Vec<String>, ReaperError> {
    let mut stmt = conn.prepare(sql).map_err(|e| ReaperError(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| ReaperError(e.to_string()))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(|e| ReaperError(e.to_string()))?);
    }
    Ok(ids)
}

/// Deletes rows whose `column` matches any collected id, in bounded batches.
fn batch_delete(
    conn: &Connection,
    table: &str,
    column: &str,
    ids: &[String],
    batch_size: usize,
) -> Result<usize, ReaperError> {
    let mut deleted = 0;

    for batch in ids.chunks(batch_size.max(1)) {
        let placeholders = vec!["?"; batch.len()].join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            table, column, placeholders
        );

        let params: Vec<&dyn rusqlite::ToSql> =
            batch.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        deleted += conn
            .execute(&sql, params.as_slice())
            .map_err(|e| ReaperError(e.to_string()))?;
    }

    Ok(deleted)
}
