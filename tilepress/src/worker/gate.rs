//! Completion gate.
//!
//! Decides, inside one store transaction, whether every tile of a job is
//! stored. The first evaluation to see a complete job moves its archive
//! state from `Empty` to `Pending` and queues the archive trigger in the
//! same commit. Later or concurrent evaluations see `Pending` (or a
//! conflict, then `Pending` on retry) and do nothing, so at most one trigger
//! is ever produced per job.

use std::sync::Arc;

use tracing::{debug, info};

use crate::job::{ArchiveState, ArchiveTrigger, JobId};
use crate::store::{JobStore, StoreError};

/// Detailed result of a completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Job has no placement yet, so there is nothing to complete
    NotStarted,
    /// Some tiles are not stored yet (possibly only not visible yet)
    Incomplete { rendered: u64, total: u64 },
    /// Every tile is stored; `triggered` is true only for the call that
    /// queued the archive trigger
    Done { triggered: bool },
}

impl Evaluation {
    pub fn is_done(&self) -> bool {
        matches!(self, Evaluation::Done { .. })
    }
}

/// Transactional completion check for jobs.
pub struct CompletionGate<S> {
    store: Arc<S>,
}

impl<S> Clone for CompletionGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: JobStore> CompletionGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns `true` once every tile of the job is stored.
    ///
    /// Safe to call any number of times from any number of workers.
    pub async fn evaluate(&self, job_id: &JobId) -> Result<bool, StoreError> {
        Ok(self.check(job_id).await?.is_done())
    }

    /// Like [`evaluate`](Self::evaluate) but reports the detailed outcome.
    pub async fn check(&self, job_id: &JobId) -> Result<Evaluation, StoreError> {
        let evaluation = self
            .store
            .run_in_transaction(job_id, |tx| {
                let record = tx.record();
                if !record.is_started() {
                    return Ok(Evaluation::NotStarted);
                }

                let total = record.total_tiles;
                let rendered = tx.rendered_tiles();
                if rendered < total {
                    return Ok(Evaluation::Incomplete { rendered, total });
                }

                let next = match &record.archive {
                    ArchiveState::Empty => record.archive.advance(ArchiveState::Pending)?,
                    ArchiveState::Pending | ArchiveState::Ready(_) => {
                        return Ok(Evaluation::Done { triggered: false });
                    }
                };
                tx.record_mut().archive = next;
                tx.enqueue_trigger(ArchiveTrigger {
                    job_id: job_id.clone(),
                });
                Ok(Evaluation::Done { triggered: true })
            })
            .await?;

        match evaluation {
            Evaluation::Done { triggered: true } => {
                info!(job_id = %job_id, "All tiles stored; archive assembly queued");
            }
            Evaluation::Incomplete { rendered, total } => {
                debug!(job_id = %job_id, rendered, total, "Job incomplete");
            }
            Evaluation::Done { triggered: false } | Evaluation::NotStarted => {}
        }
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Corners, TileCoord, WorldPoint};
    use crate::job::{JobRecord, Placement, RenderedTile};
    use crate::render::Affine;
    use crate::store::{BlobRef, MemoryJobStore};
    use bytes::Bytes;

    async fn started_job(store: &MemoryJobStore, total: u64) -> JobId {
        let id = JobId::new("gate");
        let mut record = JobRecord::new(id.clone(), "o", BlobRef::new("img"), 4, 4);
        record.placement = Some(Placement {
            corners: Corners::new(
                WorldPoint::new(0.0, 0.0),
                WorldPoint::new(1.0, 0.0),
                WorldPoint::new(1.0, 1.0),
            ),
            transform: Affine::IDENTITY,
            min_zoom: 0,
            max_zoom: 0,
        });
        record.total_tiles = total;
        store.put(record).await.unwrap();
        id
    }

    async fn store_tiles(store: &MemoryJobStore, id: &JobId, n: u32) {
        let tiles = (0..n)
            .map(|x| RenderedTile {
                job_id: id.clone(),
                tile: TileCoord::new(x, 0, 3),
                image: Bytes::from_static(b"png"),
            })
            .collect();
        store.put_tiles(tiles).await.unwrap();
    }

    #[tokio::test]
    async fn test_incomplete_job_is_not_done() {
        let store = Arc::new(MemoryJobStore::new());
        let id = started_job(&store, 3).await;
        store_tiles(&store, &id, 2).await;

        let gate = CompletionGate::new(Arc::clone(&store));
        assert_eq!(
            gate.check(&id).await.unwrap(),
            Evaluation::Incomplete {
                rendered: 2,
                total: 3
            }
        );
        assert_eq!(store.get(&id).await.unwrap().archive, ArchiveState::Empty);
        assert_eq!(store.pending_triggers(), 0);
    }

    #[tokio::test]
    async fn test_complete_job_triggers_once() {
        let store = Arc::new(MemoryJobStore::new());
        let id = started_job(&store, 3).await;
        store_tiles(&store, &id, 3).await;
        let gate = CompletionGate::new(Arc::clone(&store));

        assert_eq!(
            gate.check(&id).await.unwrap(),
            Evaluation::Done { triggered: true }
        );
        assert_eq!(
            gate.check(&id).await.unwrap(),
            Evaluation::Done { triggered: false }
        );
        assert!(gate.evaluate(&id).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().archive, ArchiveState::Pending);
        assert_eq!(store.pending_triggers(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_commit_does_not_duplicate_trigger() {
        let store = Arc::new(MemoryJobStore::new());
        let id = started_job(&store, 1).await;
        store_tiles(&store, &id, 1).await;
        store.force_conflicts(2);

        let gate = CompletionGate::new(Arc::clone(&store));
        assert!(gate.evaluate(&id).await.unwrap());
        assert!(gate.evaluate(&id).await.unwrap());
        assert_eq!(store.pending_triggers(), 1);
    }

    #[tokio::test]
    async fn test_zero_tile_job_is_done_immediately() {
        let store = Arc::new(MemoryJobStore::new());
        let id = started_job(&store, 0).await;

        let gate = CompletionGate::new(Arc::clone(&store));
        assert_eq!(
            gate.check(&id).await.unwrap(),
            Evaluation::Done { triggered: true }
        );
    }

    #[tokio::test]
    async fn test_unstarted_job_never_triggers() {
        let store = Arc::new(MemoryJobStore::new());
        let id = JobId::new("new");
        store
            .put(JobRecord::new(id.clone(), "o", BlobRef::new("img"), 4, 4))
            .await
            .unwrap();

        let gate = CompletionGate::new(Arc::clone(&store));
        assert_eq!(gate.check(&id).await.unwrap(), Evaluation::NotStarted);
        assert!(!gate.evaluate(&id).await.unwrap());
        assert_eq!(store.pending_triggers(), 0);
    }
}
