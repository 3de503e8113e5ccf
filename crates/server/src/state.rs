use std::sync::Arc;

use nocturne_core::{BlobStore, Config, RateLimiter, TaskStore};
use prometheus::Registry;

/// Shared application state
pub struct AppState {
    config: Config,
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    limiter: RateLimiter,
    registry: Registry,
}

impl AppState {
    pub fn new(
        config: Config,
        tasks: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        limiter: RateLimiter,
        registry: Registry,
    ) -> Self {
        Self {
            config,
            tasks,
            blobs,
            limiter,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
