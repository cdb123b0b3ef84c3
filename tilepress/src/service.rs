//! Tiling service facade.
//!
//! Wires the submitter, batch workers, completion gate and archive
//! dispatcher around one set of backends so callers deal with a single
//! handle:
//!
//! ```ignore
//! use tilepress::config::ConfigFile;
//! use tilepress::notify::TracingChannel;
//! use tilepress::render::AffineRenderer;
//! use tilepress::service::TilingService;
//!
//! let config = ConfigFile::load()?;
//! let service = TilingService::in_memory(AffineRenderer::default(), TracingChannel, &config);
//!
//! let job = service.create_job("alice", image_bytes).await?;
//! service.start(&job.id, corners, None).await?;
//! let dispatcher = service.spawn_dispatcher(cancel.clone());
//! service.run_workers(&job.id, 4, cancel.clone()).await?;
//! ```

use std::ops::RangeInclusive;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigFile, PyramidConfig, WorkerConfig};
use crate::coord::Corners;
use crate::error::PipelineError;
use crate::job::{ArchiveState, JobId, JobRecord, JobSubmitter, SubmitError};
use crate::notify::{NotificationChannel, NotificationEmitter};
use crate::queue::{MemoryWorkQueue, WorkQueue};
use crate::render::TileRenderer;
use crate::store::{Blob, BlobError, BlobStore, JobStore, MemoryBlobStore, MemoryJobStore, StoreError};
use crate::worker::{
    ArchiveAssembler, ArchiveDispatcher, BatchWorker, CompletionGate, RetryOrchestrator,
    RunSummary,
};

/// Errors surfaced by [`TilingService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    /// Archive requested before it was assembled
    #[error("archive for job {job_id} is not ready (state: {state})")]
    NotReady { job_id: JobId, state: &'static str },
}

/// Service over the in-process backends.
pub type MemoryTilingService<R, C> =
    TilingService<MemoryJobStore, MemoryWorkQueue, MemoryBlobStore, R, C>;

/// High-level handle over one deployment of the pipeline.
pub struct TilingService<S, Q, B, R, C> {
    store: Arc<S>,
    queue: Arc<Q>,
    blobs: Arc<B>,
    renderer: Arc<R>,
    emitter: NotificationEmitter<C>,
    worker_config: WorkerConfig,
    submitter: JobSubmitter<S, Q, B>,
}

impl<R, C> TilingService<MemoryJobStore, MemoryWorkQueue, MemoryBlobStore, R, C>
where
    R: TileRenderer,
    C: NotificationChannel,
{
    /// Builds a service on fresh in-memory backends.
    pub fn in_memory(renderer: R, channel: C, config: &ConfigFile) -> Self {
        let worker_config = WorkerConfig::from(config);
        let queue = MemoryWorkQueue::with_batch_limit(worker_config.add_batch_limit());
        Self::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(queue),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(renderer),
            Arc::new(channel),
            worker_config,
            PyramidConfig::from(config),
        )
    }
}

impl<S, Q, B, R, C> TilingService<S, Q, B, R, C>
where
    S: JobStore,
    Q: WorkQueue,
    B: BlobStore,
    R: TileRenderer,
    C: NotificationChannel,
{
    pub fn new(
        store: Arc<S>,
        queue: Arc<Q>,
        blobs: Arc<B>,
        renderer: Arc<R>,
        channel: Arc<C>,
        worker_config: WorkerConfig,
        pyramid_config: PyramidConfig,
    ) -> Self {
        let submitter = JobSubmitter::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&blobs),
            pyramid_config,
        );
        Self {
            store,
            queue,
            blobs,
            renderer,
            emitter: NotificationEmitter::new(channel),
            worker_config,
            submitter,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }

    pub fn worker_config(&self) -> &WorkerConfig {
        &self.worker_config
    }

    /// Stores an uploaded image as a new, unstarted job.
    pub async fn create_job(&self, owner: &str, image: Bytes) -> Result<JobRecord, ServiceError> {
        Ok(self.submitter.create_job(owner, image).await?)
    }

    /// Places a job and enqueues its tiles.
    pub async fn start(
        &self,
        job_id: &JobId,
        corners: Corners,
        zooms: Option<RangeInclusive<u8>>,
    ) -> Result<JobRecord, ServiceError> {
        Ok(self.submitter.start(job_id, corners, zooms).await?)
    }

    pub async fn job(&self, job_id: &JobId) -> Result<JobRecord, ServiceError> {
        Ok(self.store.get(job_id).await?)
    }

    pub async fn list_jobs(&self, owner: &str) -> Result<Vec<JobRecord>, ServiceError> {
        Ok(self.store.jobs_for_owner(owner).await?)
    }

    /// A batch worker over this service's backends.
    pub fn batch_worker(&self) -> BatchWorker<S, Q, B, R, C> {
        BatchWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.blobs),
            Arc::clone(&self.renderer),
            self.emitter.clone(),
            self.worker_config,
        )
    }

    pub fn completion_gate(&self) -> CompletionGate<S> {
        CompletionGate::new(Arc::clone(&self.store))
    }

    pub fn orchestrator(&self) -> RetryOrchestrator<S, Q, B, R, C> {
        RetryOrchestrator::new(self.batch_worker(), self.completion_gate())
    }

    pub fn assembler(&self) -> ArchiveAssembler<S, B, C> {
        ArchiveAssembler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            self.emitter.clone(),
        )
    }

    pub fn dispatcher(&self) -> ArchiveDispatcher<S, B, C> {
        ArchiveDispatcher::new(Arc::clone(&self.store), self.assembler())
    }

    /// Runs the archive dispatcher in the background until `cancel` fires.
    pub fn spawn_dispatcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let dispatcher = self.dispatcher();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    }

    /// Runs `workers` independent orchestrators on a job until it converges.
    ///
    /// A fatal error in one worker cancels the others and is returned.
    /// `cycles` in the summary is the longest run; `tiles_rendered` is the
    /// sum over all workers.
    pub async fn run_workers(
        &self,
        job_id: &JobId,
        workers: usize,
        cancel: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let workers = workers.max(1);
        let group = cancel.child_token();
        let mut tasks = JoinSet::new();

        for _ in 0..workers {
            let orchestrator = self.orchestrator();
            let job_id = job_id.clone();
            let token = group.clone();
            tasks.spawn(async move { orchestrator.run(&job_id, token).await });
        }
        info!(job_id = %job_id, workers, "Workers started");

        let mut summary = RunSummary::default();
        let mut first_error: Option<PipelineError> = None;

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(PipelineError::from).and_then(|r| r);
            match result {
                Ok(run) => {
                    summary.cycles = summary.cycles.max(run.cycles);
                    summary.tiles_rendered += run.tiles_rendered;
                }
                Err(e) => {
                    if first_error.is_none() {
                        if !matches!(e, PipelineError::Cancelled) {
                            warn!(job_id = %job_id, error = %e, "Worker failed, stopping the rest");
                        }
                        group.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    job_id = %job_id,
                    tiles = summary.tiles_rendered,
                    cycles = summary.cycles,
                    "Workers finished"
                );
                Ok(summary)
            }
        }
    }

    /// Reads the finished archive of a job.
    pub async fn download(&self, job_id: &JobId) -> Result<Blob, ServiceError> {
        let record = self.store.get(job_id).await?;
        match &record.archive {
            ArchiveState::Ready(blob) => Ok(self.blobs.read_blob(blob).await?),
            other => Err(ServiceError::NotReady {
                job_id: job_id.clone(),
                state: other.label(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::WorldPoint;
    use crate::notify::NullChannel;
    use crate::render::AffineRenderer;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png() -> Bytes {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    fn corners() -> Corners {
        Corners::new(
            WorldPoint::new(100.0, 100.0),
            WorldPoint::new(101.0, 100.0),
            WorldPoint::new(101.0, 101.0),
        )
    }

    fn service() -> MemoryTilingService<AffineRenderer, NullChannel> {
        let mut config = ConfigFile::default();
        config.worker.backoff_ms = 5;
        TilingService::in_memory(AffineRenderer::default(), NullChannel, &config)
    }

    #[tokio::test]
    async fn test_download_before_ready_is_rejected() {
        let service = service();
        let job = service.create_job("alice", png()).await.unwrap();

        let result = service.download(&job.id).await;

        assert!(matches!(
            result,
            Err(ServiceError::NotReady { state: "empty", .. })
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_owner() {
        let service = service();
        service.create_job("alice", png()).await.unwrap();
        service.create_job("bob", png()).await.unwrap();
        service.create_job("alice", png()).await.unwrap();

        assert_eq!(service.list_jobs("alice").await.unwrap().len(), 2);
        assert_eq!(service.list_jobs("carol").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_run_workers_then_download() {
        let service = service();
        let cancel = CancellationToken::new();
        let job = service.create_job("alice", png()).await.unwrap();
        service.start(&job.id, corners(), Some(0..=2)).await.unwrap();
        let dispatcher = service.spawn_dispatcher(cancel.clone());

        let summary = service
            .run_workers(&job.id, 3, cancel.clone())
            .await
            .unwrap();
        assert_eq!(summary.tiles_rendered, 3);

        let blob = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(blob) = service.download(&job.id).await {
                    return blob;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(blob.content_type, crate::worker::ARCHIVE_CONTENT_TYPE);

        cancel.cancel();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_workers_on_unstarted_job_fails() {
        let service = service();
        let job = service.create_job("alice", png()).await.unwrap();

        let result = service
            .run_workers(&job.id, 2, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(PipelineError::NotStarted(_))));
    }
}
