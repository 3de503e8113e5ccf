//! Configuration for the dispatcher and worker pool.

use serde::{Deserialize, Serialize};

/// Configuration for task dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of conversion workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the inbound work queue shared by the workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delay between claim attempts when the queue is empty, in seconds.
    #[serde(default = "default_claim_interval")]
    pub claim_interval_secs: u64,

    /// How long conversion results stay downloadable, in seconds.
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_queue_capacity() -> usize {
    8
}

fn default_claim_interval() -> u64 {
    2
}

fn default_result_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            claim_interval_secs: default_claim_interval(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.claim_interval_secs, 2);
        assert_eq!(config.result_ttl_secs, 86400);
    }

    #[test]
    fn test_deserialization_defaults() {
        let config: DispatchConfig = toml::from_str("workers = 3").unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_capacity, 8);
    }
}
