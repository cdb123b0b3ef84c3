//! Lease-based work queue.
//!
//! Work items are tagged with their job id and consumed by
//! lease-then-delete. A lease hides an item from other workers until its
//! visibility window passes; an item whose lease expires before deletion is
//! handed out again, so delivery is at-least-once.
//!
//! ```text
//!   add_batch ──► [ visible ] ──lease_by_tag──► [ claimed until t ]
//!                      ▲                               │
//!                      └────────── t passes ───────────┤
//!                                                      ▼
//!                                                   delete
//! ```

mod memory;

pub use memory::MemoryWorkQueue;

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::job::{JobId, WorkItem};

/// Items accepted per `add_batch` call by default.
pub const DEFAULT_ADD_BATCH_LIMIT: usize = 100;

/// Errors from the work queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Temporary failure; the operation may be retried
    #[error("transient queue error: {0}")]
    Transient(String),

    /// More items than the provider accepts in one call
    #[error("batch of {len} items exceeds queue limit of {limit}")]
    BatchTooLarge { len: usize, limit: usize },
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Transient(_))
    }
}

/// A work item claimed by one worker until `expires_at`.
#[derive(Debug, Clone)]
pub struct LeasedItem {
    /// Queue-assigned identity, stable across re-leases
    pub item_id: u64,
    pub item: WorkItem,
    pub expires_at: Instant,
}

/// Tagged, lease-based pull queue.
pub trait WorkQueue: Send + Sync + 'static {
    /// Claims up to `max` visible items tagged `tag` for `visibility`.
    ///
    /// Returns an empty vector when nothing is currently visible.
    fn lease_by_tag(
        &self,
        max: usize,
        tag: &JobId,
        visibility: Duration,
    ) -> impl Future<Output = Result<Vec<LeasedItem>, QueueError>> + Send;

    /// Deletes consumed items. Deleting an already deleted item succeeds.
    fn delete(&self, items: &[LeasedItem]) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Adds items; at most [`WorkQueue::batch_limit`] per call.
    fn add_batch(&self, items: Vec<WorkItem>)
        -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Maximum items accepted by one `add_batch` call.
    fn batch_limit(&self) -> usize {
        DEFAULT_ADD_BATCH_LIMIT
    }
}

/// Adds any number of items, chunked to the queue's batch limit.
///
/// Returns the number of items enqueued. Chunks already added stay in the
/// queue if a later chunk fails.
pub async fn enqueue_all<Q: WorkQueue>(queue: &Q, items: Vec<WorkItem>) -> Result<usize, QueueError> {
    let limit = queue.batch_limit().max(1);
    let total = items.len();
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk: Vec<WorkItem> = items.by_ref().take(limit).collect();
        queue.add_batch(chunk).await?;
    }
    Ok(total)
}
