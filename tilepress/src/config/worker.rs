//! Worker and convergence configuration.

use std::time::Duration;

use super::defaults::{
    DEFAULT_ADD_BATCH_LIMIT, DEFAULT_BACKOFF_MS, DEFAULT_BATCH_SIZE, DEFAULT_SECONDS_PER_TILE,
    DEFAULT_WORKERS,
};
use super::file::ConfigFile;

/// Configuration for batch workers and the retry loop.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tilepress::config::WorkerConfig;
///
/// let config = WorkerConfig::default();
/// assert_eq!(config.batch_size(), 10);
/// assert_eq!(config.lease_visibility(), Duration::from_secs(20));
///
/// let config = WorkerConfig::new()
///     .with_batch_size(4)
///     .with_backoff(Duration::from_millis(50));
/// assert_eq!(config.lease_visibility(), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    batch_size: usize,
    seconds_per_tile: u64,
    backoff: Duration,
    workers: usize,
    add_batch_limit: usize,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of items leased (and rendered in parallel) per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-tile time budget used to size lease visibility.
    pub fn with_seconds_per_tile(mut self, seconds: u64) -> Self {
        self.seconds_per_tile = seconds.max(1);
        self
    }

    /// Set the pause between convergence cycles.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the number of workers spawned per job.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the maximum number of items per enqueue call.
    pub fn with_add_batch_limit(mut self, limit: usize) -> Self {
        self.add_batch_limit = limit.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seconds_per_tile(&self) -> u64 {
        self.seconds_per_tile
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn add_batch_limit(&self) -> usize {
        self.add_batch_limit
    }

    /// Lease visibility for a full batch.
    pub fn lease_visibility(&self) -> Duration {
        self.lease_visibility_for(self.batch_size)
    }

    /// Lease visibility for a batch of `items` work items.
    ///
    /// Must exceed the worst-case render and commit time of that batch, or
    /// items are re-leased while still in flight.
    pub fn lease_visibility_for(&self, items: usize) -> Duration {
        Duration::from_secs(self.seconds_per_tile.saturating_mul(items.max(1) as u64))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seconds_per_tile: DEFAULT_SECONDS_PER_TILE,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            workers: DEFAULT_WORKERS,
            add_batch_limit: DEFAULT_ADD_BATCH_LIMIT,
        }
    }
}

impl From<&ConfigFile> for WorkerConfig {
    fn from(config: &ConfigFile) -> Self {
        Self::new()
            .with_batch_size(config.worker.batch_size)
            .with_seconds_per_tile(config.worker.seconds_per_tile)
            .with_backoff(Duration::from_millis(config.worker.backoff_ms))
            .with_workers(config.worker.workers)
            .with_add_batch_limit(config.queue.add_batch_limit)
    }
}
