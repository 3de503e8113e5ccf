//! The claim loop that feeds the worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::blob::BlobStore;
use crate::convert::AudioConverter;
use crate::metrics;
use crate::task::{Task, TaskStore};

use super::config::DispatchConfig;
use super::worker;

/// One unit handed to the worker pool.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Task(Task),
    /// Termination marker; each worker consumes exactly one and exits.
    Shutdown,
}

/// Claims queued tasks and feeds them to a fixed pool of workers.
pub struct Dispatcher {
    config: DispatchConfig,
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    converter: Arc<dyn AudioConverter>,

    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        config: DispatchConfig,
        tasks: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        converter: Arc<dyn AudioConverter>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            tasks,
            blobs,
            converter,
            running: AtomicBool::new(false),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the claim loop and worker pool.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Dispatcher already running");
            return;
        }

        info!(workers = self.config.workers, "Starting dispatcher");

        let (tx, rx) = mpsc::channel::<WorkItem>(self.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = self.handles.lock().await;

        for worker_id in 0..self.config.workers {
            handles.push(tokio::spawn(worker::run_worker(
                worker_id + 1,
                Arc::clone(&rx),
                Arc::clone(&self.tasks),
                Arc::clone(&self.blobs),
                Arc::clone(&self.converter),
                self.config.result_ttl_secs,
            )));
        }

        handles.push(tokio::spawn(Self::claim_loop(
            self.config.clone(),
            Arc::clone(&self.tasks),
            tx,
            self.shutdown_tx.subscribe(),
        )));

        info!("Dispatcher started");
    }

    /// Stop claiming, drain the workers, and wait for them to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Dispatcher not running");
            return;
        }

        info!("Stopping dispatcher");
        let _ = self.shutdown_tx.send(());

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        info!("Dispatcher stopped");
    }

    /// The claim loop: pull the oldest queued task and push it to the pool.
    async fn claim_loop(
        config: DispatchConfig,
        tasks: Arc<dyn TaskStore>,
        tx: mpsc::Sender<WorkItem>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Claim loop started");
        let idle_delay = Duration::from_secs(config.claim_interval_secs.max(1));

        loop {
            // Drain a shutdown signal that arrived while we were claiming.
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match tasks.claim_oldest() {
                Ok(Some(task)) => {
                    metrics::TASKS_CLAIMED.inc();
                    // A full queue blocks here until a worker frees a slot.
                    if tx.send(WorkItem::Task(task)).await.is_err() {
                        error!("Worker queue closed unexpectedly");
                        break;
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(idle_delay) => {}
                    }
                }
                Err(e) => {
                    error!("Claim attempt failed: {}", e);
                    metrics::LOOP_ERRORS.with_label_values(&["dispatch"]).inc();
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(idle_delay) => {}
                    }
                }
            }
        }

        // One termination marker per worker; each worker exits after
        // consuming exactly one.
        for _ in 0..config.workers {
            if tx.send(WorkItem::Shutdown).await.is_err() {
                break;
            }
        }

        info!("Claim loop stopped");
    }
}
