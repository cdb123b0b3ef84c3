//! Archive dispatcher.
//!
//! Drains archive triggers from the store outbox and runs the assembler for
//! each one. Runs independently of any batch worker, so assembly happens
//! even if the worker that completed the job has exited.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::archive::ArchiveAssembler;
use super::index::{HtmlIndex, IndexDocument};
use crate::error::{ArchiveError, PipelineError};
use crate::job::{ArchiveState, ArchiveTrigger, JobId};
use crate::notify::NotificationChannel;
use crate::store::{BlobStore, JobStore, StoreError};

/// How often an idle dispatcher checks the outbox.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Hands archive triggers to an [`ArchiveAssembler`].
pub struct ArchiveDispatcher<S, B, C, I = HtmlIndex> {
    store: Arc<S>,
    assembler: ArchiveAssembler<S, B, C, I>,
    poll_interval: Duration,
}

impl<S, B, C, I> ArchiveDispatcher<S, B, C, I>
where
    S: JobStore,
    B: BlobStore,
    C: NotificationChannel,
    I: IndexDocument,
{
    pub fn new(store: Arc<S>, assembler: ArchiveAssembler<S, B, C, I>) -> Self {
        Self {
            store,
            assembler,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Processes every trigger currently in the outbox.
    ///
    /// Assembly failures are logged and not retried; the job stays
    /// `Pending` until [`requeue`](Self::requeue) is called for it.
    /// Returns the number of archives assembled.
    pub async fn run_pending(&self) -> Result<usize, StoreError> {
        let mut assembled = 0;
        while let Some(ArchiveTrigger { job_id }) = self.store.claim_trigger().await? {
            debug!(job_id = %job_id, "Claimed archive trigger");
            match self.assembler.assemble(&job_id).await {
                Ok(_) => assembled += 1,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Archive assembly failed");
                }
            }
        }
        Ok(assembled)
    }

    /// Polls the outbox until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Archive dispatcher started");
        loop {
            if let Err(e) = self.run_pending().await {
                error!(error = %e, "Failed to claim archive trigger");
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Archive dispatcher stopped");
    }

    /// Re-queues the archive trigger of a job stuck in `Pending`.
    ///
    /// Never called automatically.
    pub async fn requeue(&self, job_id: &JobId) -> Result<(), PipelineError> {
        let rejected = self
            .store
            .run_in_transaction(job_id, |tx| {
                if !matches!(tx.record().archive, ArchiveState::Pending) {
                    return Ok(Some(tx.record().archive.label()));
                }
                tx.enqueue_trigger(ArchiveTrigger {
                    job_id: job_id.clone(),
                });
                Ok(None)
            })
            .await?;

        if let Some(state) = rejected {
            return Err(ArchiveError::NotPending {
                job_id: job_id.clone(),
                state,
            }
            .into());
        }
        info!(job_id = %job_id, "Archive trigger re-queued");
        Ok(())
    }
}
