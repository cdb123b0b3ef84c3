//! In-memory job store with optimistic transactions.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{JobStore, StoreError, Transaction, MAX_TRANSACTION_ATTEMPTS};
use crate::coord::TileCoord;
use crate::job::{ArchiveTrigger, JobId, JobRecord, RenderedTile};

struct VersionedRecord {
    record: JobRecord,
    version: u64,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, VersionedRecord>,
    tiles: HashMap<JobId, BTreeMap<TileCoord, Bytes>>,
    outbox: VecDeque<ArchiveTrigger>,
}

impl Inner {
    fn tile_count(&self, job_id: &JobId) -> u64 {
        self.tiles.get(job_id).map_or(0, |t| t.len() as u64)
    }
}

/// Job store backed by a single mutex.
///
/// Each job record carries a version bumped on every write. Transactions
/// snapshot the record, run the body without holding the lock, and commit
/// only if the version is unchanged.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    /// Commits to fail before honouring the version check (tests only).
    forced_conflicts: AtomicU32,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triggers waiting in the outbox.
    pub fn pending_triggers(&self) -> usize {
        self.inner.lock().outbox.len()
    }

    /// Makes the next `n` committing transactions lose their version check.
    #[cfg(test)]
    pub(crate) fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn snapshot(&self, job_id: &JobId) -> Result<(JobRecord, u64, u64), StoreError> {
        let inner = self.inner.lock();
        let entry = inner
            .jobs
            .get(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
        Ok((entry.record.clone(), entry.version, inner.tile_count(job_id)))
    }

    /// Commits a transaction attempt. Returns `false` on a version conflict.
    fn try_commit(
        &self,
        job_id: &JobId,
        version: u64,
        record: Option<JobRecord>,
        triggers: Vec<ArchiveTrigger>,
    ) -> bool {
        if self.take_forced_conflict() {
            return false;
        }
        let mut inner = self.inner.lock();
        let Some(entry) = inner.jobs.get_mut(job_id) else {
            return false;
        };
        if entry.version != version {
            return false;
        }
        if let Some(record) = record {
            entry.record = record;
            entry.version += 1;
        }
        inner.outbox.extend(triggers);
        true
    }
}

impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &JobId) -> Result<JobRecord, StoreError> {
        self.snapshot(job_id).map(|(record, _, _)| record)
    }

    async fn put(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(&record.id) {
            Some(entry) => {
                entry.record = record;
                entry.version += 1;
            }
            None => {
                inner
                    .jobs
                    .insert(record.id.clone(), VersionedRecord { record, version: 0 });
            }
        }
        Ok(())
    }

    async fn run_in_transaction<T, F>(&self, job_id: &JobId, mut f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&mut Transaction) -> Result<T, StoreError> + Send,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let (record, version, rendered) = self.snapshot(job_id)?;
            let mut tx = Transaction::new(record, rendered);
            let value = f(&mut tx)?;

            let (record, triggers) = tx.into_parts();
            if record.is_none() && triggers.is_empty() {
                return Ok(value);
            }
            if self.try_commit(job_id, version, record, triggers) {
                trace!(job_id = %job_id, attempt, "transaction committed");
                return Ok(value);
            }

            debug!(job_id = %job_id, attempt, "transaction conflict, retrying");
            tokio::task::yield_now().await;
        }

        Err(StoreError::Conflict {
            job_id: job_id.clone(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }

    async fn put_tiles(&self, tiles: Vec<RenderedTile>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(missing) = tiles.iter().find(|t| !inner.jobs.contains_key(&t.job_id)) {
            return Err(StoreError::NotFound(missing.job_id.clone()));
        }
        for tile in tiles {
            inner
                .tiles
                .entry(tile.job_id)
                .or_default()
                .insert(tile.tile, tile.image);
        }
        Ok(())
    }

    async fn count_tiles(&self, job_id: &JobId) -> Result<u64, StoreError> {
        Ok(self.inner.lock().tile_count(job_id))
    }

    async fn tiles_for_job(&self, job_id: &JobId) -> Result<Vec<RenderedTile>, StoreError> {
        let inner = self.inner.lock();
        let tiles = inner
            .tiles
            .get(job_id)
            .map(|tiles| {
                tiles
                    .iter()
                    .map(|(coord, image)| RenderedTile {
                        job_id: job_id.clone(),
                        tile: *coord,
                        image: image.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tiles)
    }

    async fn jobs_for_owner(&self, owner: &str) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut records: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|v| v.record.owner == owner)
            .map(|v| v.record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn claim_trigger(&self) -> Result<Option<ArchiveTrigger>, StoreError> {
        Ok(self.inner.lock().outbox.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ArchiveState;
    use crate::store::BlobRef;
    use std::sync::Arc;

    fn record(id: &str, owner: &str) -> JobRecord {
        let mut record = JobRecord::new(JobId::new(id), owner, BlobRef::new("img"), 8, 8);
        record.total_tiles = 2;
        record
    }

    fn tile(job: &str, x: u32, y: u32, zoom: u8, byte: u8) -> RenderedTile {
        RenderedTile {
            job_id: JobId::new(job),
            tile: TileCoord::new(x, y, zoom),
            image: Bytes::from(vec![byte]),
        }
    }

    #[tokio::test]
    async fn test_get_missing_job() {
        let store = MemoryJobStore::new();
        let result = store.get(&JobId::new("absent")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_tiles_overwrites_same_coordinate() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();

        store.put_tiles(vec![tile("j", 0, 0, 1, 1)]).await.unwrap();
        store.put_tiles(vec![tile("j", 0, 0, 1, 2)]).await.unwrap();

        let job = JobId::new("j");
        assert_eq!(store.count_tiles(&job).await.unwrap(), 1);
        let tiles = store.tiles_for_job(&job).await.unwrap();
        assert_eq!(tiles[0].image, Bytes::from(vec![2]));
    }

    #[tokio::test]
    async fn test_put_tiles_unknown_job_writes_nothing() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();

        let result = store
            .put_tiles(vec![tile("j", 0, 0, 0, 1), tile("ghost", 0, 0, 0, 1)])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.count_tiles(&JobId::new("j")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tiles_for_job_ordered_by_zoom_x_y() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();
        store
            .put_tiles(vec![
                tile("j", 1, 0, 2, 0),
                tile("j", 0, 0, 1, 0),
                tile("j", 0, 3, 2, 0),
            ])
            .await
            .unwrap();

        let order: Vec<TileCoord> = store
            .tiles_for_job(&JobId::new("j"))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.tile)
            .collect();
        assert_eq!(
            order,
            vec![
                TileCoord::new(0, 0, 1),
                TileCoord::new(0, 3, 2),
                TileCoord::new(1, 0, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_transaction_trigger_published_on_commit() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();
        let job = JobId::new("j");

        store
            .run_in_transaction(&job, |tx| {
                tx.record_mut().archive = ArchiveState::Pending;
                tx.enqueue_trigger(ArchiveTrigger { job_id: job.clone() });
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.get(&job).await.unwrap().archive, ArchiveState::Pending);
        assert_eq!(store.claim_trigger().await.unwrap().unwrap().job_id, job);
        assert!(store.claim_trigger().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conflict_reruns_body_without_duplicate_triggers() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();
        store.force_conflicts(3);
        let job = JobId::new("j");

        let mut runs = 0;
        store
            .run_in_transaction(&job, |tx| {
                runs += 1;
                tx.record_mut().archive = ArchiveState::Pending;
                tx.enqueue_trigger(ArchiveTrigger { job_id: job.clone() });
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(runs, 4);
        assert_eq!(store.pending_triggers(), 1);
    }

    #[tokio::test]
    async fn test_conflict_exhaustion_reports_error() {
        let store = MemoryJobStore::new();
        store.put(record("j", "o")).await.unwrap();
        store.force_conflicts(MAX_TRANSACTION_ATTEMPTS);

        let result = store
            .run_in_transaction(&JobId::new("j"), |tx| {
                tx.record_mut().total_tiles = 3;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict { attempts, .. }) if attempts == MAX_TRANSACTION_ATTEMPTS));
        assert_eq!(store.pending_triggers(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_transactions_serialize() {
        let store = Arc::new(MemoryJobStore::new());
        store.put(record("j", "o")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .run_in_transaction(&JobId::new("j"), |tx| {
                        tx.record_mut().total_tiles += 1;
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get(&JobId::new("j")).await.unwrap().total_tiles, 10);
    }

    #[tokio::test]
    async fn test_jobs_for_owner() {
        let store = MemoryJobStore::new();
        store.put(record("b", "alice")).await.unwrap();
        store.put(record("a", "alice")).await.unwrap();
        store.put(record("c", "bob")).await.unwrap();

        let ids: Vec<String> = store
            .jobs_for_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
