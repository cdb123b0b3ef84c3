//! Batch worker: lease, render, commit.
//!
//! [`BatchWorker`] drains the work queue for one job. Each batch of leased
//! items is rendered in parallel on the blocking pool, then committed as one
//! unit (store tiles, delete items, announce progress). The commit runs as a
//! background task so the next lease overlaps it.
//!
//! ```text
//!  lease ─► render ×N ─► spawn commit ─┐
//!    ▲                                 │ (overlaps)
//!    └─────────────────────────────────┘
//!  lease returns nothing ─► wait for outstanding commits ─► return
//! ```
//!
//! The first failure anywhere (lease, render, store, delete) ends the call
//! with that error. Items of an aborted batch stay leased until their
//! visibility window passes and are then picked up again.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::context::RenderContext;
use crate::config::WorkerConfig;
use crate::error::PipelineError;
use crate::job::{JobId, RenderedTile};
use crate::notify::{NotificationChannel, NotificationEmitter};
use crate::queue::{LeasedItem, WorkQueue};
use crate::render::TileRenderer;
use crate::store::{BlobStore, JobStore};

/// Outcome of one [`BatchWorker::run_batches_with`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Batches leased and rendered
    pub batches: usize,
    /// Tiles committed
    pub tiles: usize,
}

/// Leases and renders work items for a job until the queue runs dry.
pub struct BatchWorker<S, Q, B, R, C> {
    store: Arc<S>,
    queue: Arc<Q>,
    blobs: Arc<B>,
    renderer: Arc<R>,
    emitter: NotificationEmitter<C>,
    config: WorkerConfig,
}

impl<S, Q, B, R, C> Clone for BatchWorker<S, Q, B, R, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            blobs: Arc::clone(&self.blobs),
            renderer: Arc::clone(&self.renderer),
            emitter: self.emitter.clone(),
            config: self.config,
        }
    }
}

impl<S, Q, B, R, C> BatchWorker<S, Q, B, R, C>
where
    S: JobStore,
    Q: WorkQueue,
    B: BlobStore,
    R: TileRenderer,
    C: NotificationChannel,
{
    /// Creates a batch worker.
    ///
    /// # Arguments
    ///
    /// * `store` - Job and tile store
    /// * `queue` - Work queue holding the job's items
    /// * `blobs` - Blob store holding source images
    /// * `renderer` - Tile renderer
    /// * `emitter` - Progress notifications
    /// * `config` - Lease sizing
    pub fn new(
        store: Arc<S>,
        queue: Arc<Q>,
        blobs: Arc<B>,
        renderer: Arc<R>,
        emitter: NotificationEmitter<C>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            blobs,
            renderer,
            emitter,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn emitter(&self) -> &NotificationEmitter<C> {
        &self.emitter
    }

    /// Loads the job's render context.
    pub async fn load_context(&self, job_id: &JobId) -> Result<RenderContext, PipelineError> {
        RenderContext::load(self.store.as_ref(), self.blobs.as_ref(), job_id).await
    }

    /// Loads the job and drains its queue in batches of `concurrency`.
    pub async fn run_batches(
        &self,
        job_id: &JobId,
        concurrency: usize,
    ) -> Result<BatchReport, PipelineError> {
        let ctx = self.load_context(job_id).await?;
        self.run_batches_with(&ctx, concurrency).await
    }

    /// Drains the queue for an already loaded job.
    ///
    /// Returns once a lease yields no items and every commit has finished.
    pub async fn run_batches_with(
        &self,
        ctx: &RenderContext,
        concurrency: usize,
    ) -> Result<BatchReport, PipelineError> {
        let batch_size = concurrency.max(1);
        let visibility = self.config.lease_visibility_for(batch_size);
        let job_id = ctx.job_id();

        let mut commits: JoinSet<Result<usize, PipelineError>> = JoinSet::new();
        let mut report = BatchReport::default();
        let mut first_error: Option<PipelineError> = None;

        loop {
            // Surface finished commits before leasing more work.
            while let Some(joined) = commits.try_join_next() {
                match flatten(joined) {
                    Ok(n) => report.tiles += n,
                    Err(e) => {
                        first_error = Some(e);
                        break;
                    }
                }
            }
            if first_error.is_some() {
                break;
            }

            let leased = match self.queue.lease_by_tag(batch_size, job_id, visibility).await {
                Ok(leased) => leased,
                Err(e) => {
                    first_error = Some(e.into());
                    break;
                }
            };
            if leased.is_empty() {
                break;
            }

            debug!(job_id = %job_id, items = leased.len(), "Leased batch");
            let tiles = match self.render_batch(ctx, &leased).await {
                Ok(tiles) => tiles,
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            };
            report.batches += 1;

            commits.spawn(commit_batch(
                Arc::clone(&self.store),
                Arc::clone(&self.queue),
                self.emitter.clone(),
                job_id.clone(),
                ctx.total_tiles(),
                tiles,
                leased,
            ));
        }

        // Outstanding commits are idempotent writes; let them land.
        while let Some(joined) = commits.join_next().await {
            match flatten(joined) {
                Ok(n) => report.tiles += n,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            debug!(job_id = %job_id, error = %e, "Batch run aborted");
            return Err(e);
        }

        if report.batches > 0 {
            info!(
                job_id = %job_id,
                batches = report.batches,
                tiles = report.tiles,
                "Queue drained"
            );
        }
        Ok(report)
    }

    /// Renders every leased item in parallel. Fails on the first error.
    async fn render_batch(
        &self,
        ctx: &RenderContext,
        leased: &[LeasedItem],
    ) -> Result<Vec<RenderedTile>, PipelineError> {
        let mut renders = JoinSet::new();
        for lease in leased {
            let renderer = Arc::clone(&self.renderer);
            let source = ctx.source();
            let transform = ctx.transform();
            let tile = lease.item.tile;
            renders.spawn_blocking(move || {
                renderer
                    .render(tile, &transform, &source)
                    .map(|bytes| (tile, bytes))
            });
        }

        let mut tiles = Vec::with_capacity(leased.len());
        while let Some(joined) = renders.join_next().await {
            let (tile, bytes) = match joined {
                Ok(Ok(rendered)) => rendered,
                Ok(Err(e)) => {
                    renders.abort_all();
                    return Err(e.into());
                }
                Err(e) => {
                    renders.abort_all();
                    return Err(e.into());
                }
            };
            tiles.push(RenderedTile {
                job_id: ctx.job_id().clone(),
                tile,
                image: Bytes::from(bytes),
            });
        }
        tiles.sort_by_key(|t| t.tile);
        Ok(tiles)
    }
}

/// Stores a rendered batch, deletes its work items and announces progress.
///
/// Tiles are written before items are deleted, so a failure in between
/// leaves the items to be re-leased and rendered again.
async fn commit_batch<S, Q, C>(
    store: Arc<S>,
    queue: Arc<Q>,
    emitter: NotificationEmitter<C>,
    job_id: JobId,
    total: u64,
    tiles: Vec<RenderedTile>,
    leased: Vec<LeasedItem>,
) -> Result<usize, PipelineError>
where
    S: JobStore,
    Q: WorkQueue,
    C: NotificationChannel,
{
    let ids: Vec<String> = tiles.iter().map(|t| t.tile.id()).collect();
    let count = tiles.len();

    store.put_tiles(tiles).await?;
    queue.delete(&leased).await?;
    emitter.emit_progress(&job_id, total, ids).await;

    debug!(job_id = %job_id, tiles = count, "Committed batch");
    Ok(count)
}

fn flatten(
    joined: Result<Result<usize, PipelineError>, tokio::task::JoinError>,
) -> Result<usize, PipelineError> {
    joined.map_err(PipelineError::from).and_then(|r| r)
}
