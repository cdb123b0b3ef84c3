//! Retry orchestrator: drive a job to completion.
//!
//! One run repeats a full cycle until the completion gate reports the job
//! done:
//!
//! ```text
//!  ┌──► run_batches (lease until empty) ──► evaluate ──► done? ──► tiles-done
//!  │                                                       │
//!  └──────────────────── backoff ◄──────── no ─────────────┘
//! ```
//!
//! Each cycle re-leases rather than re-checking, so items whose leases
//! expired (a crashed worker, a slow commit) are picked up again. There is
//! no retry limit. Transient queue and store errors cost one backoff;
//! anything else ends the run.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::batch::BatchWorker;
use super::gate::CompletionGate;
use crate::error::PipelineError;
use crate::job::JobId;
use crate::notify::NotificationChannel;
use crate::queue::WorkQueue;
use crate::render::TileRenderer;
use crate::store::{BlobStore, JobStore};
use crate::time::PhaseTimer;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lease/evaluate cycles performed
    pub cycles: u32,
    /// Tiles committed by this run (other workers' tiles not included)
    pub tiles_rendered: usize,
}

/// Runs batch workers and the completion gate until a job converges.
pub struct RetryOrchestrator<S, Q, B, R, C> {
    worker: BatchWorker<S, Q, B, R, C>,
    gate: CompletionGate<S>,
    backoff: Duration,
}

impl<S, Q, B, R, C> Clone for RetryOrchestrator<S, Q, B, R, C> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            gate: self.gate.clone(),
            backoff: self.backoff,
        }
    }
}

impl<S, Q, B, R, C> RetryOrchestrator<S, Q, B, R, C>
where
    S: JobStore,
    Q: WorkQueue,
    B: BlobStore,
    R: TileRenderer,
    C: NotificationChannel,
{
    /// Creates an orchestrator; the backoff comes from the worker's config.
    pub fn new(worker: BatchWorker<S, Q, B, R, C>, gate: CompletionGate<S>) -> Self {
        let backoff = worker.config().backoff();
        Self {
            worker,
            gate,
            backoff,
        }
    }

    /// Drives `job_id` until every tile is stored.
    ///
    /// Emits the tiles-done notification before returning `Ok`. Returns
    /// [`PipelineError::Cancelled`] if `cancel` fires first.
    pub async fn run(
        &self,
        job_id: &JobId,
        cancel: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let mut timer = PhaseTimer::new();

        let ctx = loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.worker.load_context(job_id).await {
                Ok(ctx) => break ctx,
                Err(e) if e.is_retryable() => {
                    warn!(job_id = %job_id, error = %e, "Failed to load job, retrying");
                    self.pause(&cancel).await?;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to load job");
                    return Err(e);
                }
            }
        };
        timer.point("load");

        let batch_size = self.worker.config().batch_size();
        let mut summary = RunSummary::default();

        loop {
            summary.cycles += 1;

            let batches = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = self.worker.run_batches_with(&ctx, batch_size) => result,
            };
            timer.point("generate");

            match batches {
                Ok(report) => summary.tiles_rendered += report.tiles,
                Err(e) if e.is_retryable() => {
                    warn!(
                        job_id = %job_id,
                        cycle = summary.cycles,
                        error = %e,
                        "Transient failure while generating tiles, retrying"
                    );
                    self.pause(&cancel).await?;
                    continue;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Tile generation failed");
                    return Err(e);
                }
            }

            let done = match self.gate.evaluate(job_id).await {
                Ok(done) => done,
                Err(e) if e.is_retryable() => {
                    warn!(job_id = %job_id, error = %e, "Completion check failed, retrying");
                    false
                }
                Err(e) => return Err(e.into()),
            };
            timer.point("evaluate");

            if done {
                break;
            }
            self.pause(&cancel).await?;
        }

        self.worker.emitter().emit_tiles_done(job_id).await;
        info!(
            job_id = %job_id,
            cycles = summary.cycles,
            tiles = summary.tiles_rendered,
            load_ms = timer.total("load").as_millis() as u64,
            generate_ms = timer.total("generate").as_millis() as u64,
            evaluate_ms = timer.total("evaluate").as_millis() as u64,
            "Tiles done"
        );
        Ok(summary)
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = tokio::time::sleep(self.backoff) => Ok(()),
        }
    }
}
