//! In-memory work queue.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::{LeasedItem, QueueError, WorkQueue, DEFAULT_ADD_BATCH_LIMIT};
use crate::job::{JobId, WorkItem};

struct Entry {
    item: WorkItem,
    claimed_until: Option<Instant>,
}

impl Entry {
    fn visible(&self, now: Instant) -> bool {
        self.claimed_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u64, Entry>,
    next_id: u64,
}

/// Work queue held in process memory.
///
/// Claims are compare-and-set on each entry's claimed-until timestamp under
/// one lock, so two leases never hold the same item at the same time.
/// Times come from `tokio::time`, so a paused test clock controls expiry.
pub struct MemoryWorkQueue {
    inner: Mutex<Inner>,
    batch_limit: usize,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::with_batch_limit(DEFAULT_ADD_BATCH_LIMIT)
    }

    pub fn with_batch_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            batch_limit: limit.max(1),
        }
    }

    /// Items not yet deleted, visible or claimed.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items of one job not yet deleted.
    pub fn remaining(&self, tag: &JobId) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| &e.item.job_id == tag)
            .count()
    }
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue for MemoryWorkQueue {
    async fn lease_by_tag(
        &self,
        max: usize,
        tag: &JobId,
        visibility: Duration,
    ) -> Result<Vec<LeasedItem>, QueueError> {
        let now = Instant::now();
        let expires_at = now + visibility;
        let mut inner = self.inner.lock();

        let leased: Vec<LeasedItem> = inner
            .entries
            .iter_mut()
            .filter(|(_, e)| &e.item.job_id == tag && e.visible(now))
            .take(max)
            .map(|(id, e)| {
                e.claimed_until = Some(expires_at);
                LeasedItem {
                    item_id: *id,
                    item: e.item.clone(),
                    expires_at,
                }
            })
            .collect();

        trace!(job_id = %tag, count = leased.len(), "leased work items");
        Ok(leased)
    }

    async fn delete(&self, items: &[LeasedItem]) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        for leased in items {
            inner.entries.remove(&leased.item_id);
        }
        Ok(())
    }

    async fn add_batch(&self, items: Vec<WorkItem>) -> Result<(), QueueError> {
        if items.len() > self.batch_limit {
            return Err(QueueError::BatchTooLarge {
                len: items.len(),
                limit: self.batch_limit,
            });
        }
        let mut inner = self.inner.lock();
        for item in items {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(
                id,
                Entry {
                    item,
                    claimed_until: None,
                },
            );
        }
        Ok(())
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}
