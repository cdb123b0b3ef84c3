//! Persistent state: job records, rendered tiles and blobs.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          JobStore                             │
//! │                                                               │
//! │  JobRecord (versioned)     RenderedTile (job, x, y, zoom)     │
//! │         │                         │                           │
//! │         └──── run_in_transaction ─┘ ──► outbox: ArchiveTrigger │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │  BlobStore: source images and finished archives              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transactions are scoped to one job record. The closure sees a snapshot of
//! the record and its rendered-tile count; on commit the record version is
//! compared and the whole closure re-runs on conflict. Archive triggers
//! queued inside a transaction reach the outbox only if that attempt commits.

mod blob;
mod memory;

pub use blob::{Blob, BlobError, BlobRef, BlobStore, MemoryBlobStore};
pub use memory::MemoryJobStore;

use std::future::Future;

use crate::job::{ArchiveTrigger, JobId, JobRecord, RenderedTile, TransitionError};

/// Maximum attempts for one transaction before reporting a conflict.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 16;

/// Errors from the job store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record for the job
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Transaction kept losing the optimistic version check
    #[error("transaction on job {job_id} conflicted {attempts} times")]
    Conflict { job_id: JobId, attempts: u32 },

    /// Transaction body attempted an illegal archive transition
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Backend temporarily unavailable
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the surrounding step may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

/// Working view of one job inside a transaction.
#[derive(Debug)]
pub struct Transaction {
    record: JobRecord,
    rendered: u64,
    triggers: Vec<ArchiveTrigger>,
    dirty: bool,
}

impl Transaction {
    /// Opens a transaction over a snapshot.
    ///
    /// Called by store implementations, not by transaction bodies.
    pub fn new(record: JobRecord, rendered: u64) -> Self {
        Self {
            record,
            rendered,
            triggers: Vec::new(),
            dirty: false,
        }
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    /// Mutable access; the record is written back on commit.
    pub fn record_mut(&mut self) -> &mut JobRecord {
        self.dirty = true;
        &mut self.record
    }

    /// Rendered tiles stored for the job when the snapshot was taken.
    pub fn rendered_tiles(&self) -> u64 {
        self.rendered
    }

    /// Queues an archive trigger, published only if this attempt commits.
    pub fn enqueue_trigger(&mut self, trigger: ArchiveTrigger) {
        self.triggers.push(trigger);
    }

    /// Returns the record to write (if modified) and the queued triggers.
    pub fn into_parts(self) -> (Option<JobRecord>, Vec<ArchiveTrigger>) {
        let record = if self.dirty { Some(self.record) } else { None };
        (record, self.triggers)
    }
}

/// Transactional store for job records and rendered tiles.
pub trait JobStore: Send + Sync + 'static {
    /// Reads a job record.
    fn get(&self, job_id: &JobId) -> impl Future<Output = Result<JobRecord, StoreError>> + Send;

    /// Writes a job record, replacing any existing one.
    fn put(&self, record: JobRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Runs `f` against a snapshot of the job and commits its changes.
    ///
    /// The body may run several times if it races another writer; it must
    /// not have side effects outside the [`Transaction`].
    fn run_in_transaction<T, F>(
        &self,
        job_id: &JobId,
        f: F,
    ) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        T: Send,
        F: FnMut(&mut Transaction) -> Result<T, StoreError> + Send;

    /// Writes rendered tiles as one unit, overwriting any tile already
    /// stored for the same job and coordinate.
    fn put_tiles(
        &self,
        tiles: Vec<RenderedTile>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Number of distinct tiles stored for the job.
    fn count_tiles(&self, job_id: &JobId) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// All tiles of a job ordered by (zoom, x, y).
    fn tiles_for_job(
        &self,
        job_id: &JobId,
    ) -> impl Future<Output = Result<Vec<RenderedTile>, StoreError>> + Send;

    /// Records owned by `owner`, ordered by job id.
    fn jobs_for_owner(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<Vec<JobRecord>, StoreError>> + Send;

    /// Removes and returns the oldest archive trigger, if any.
    fn claim_trigger(
        &self,
    ) -> impl Future<Output = Result<Option<ArchiveTrigger>, StoreError>> + Send;
}
