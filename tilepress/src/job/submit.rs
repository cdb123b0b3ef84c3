//! Job submission: upload and processing start.

use std::io::Cursor;
use std::ops::RangeInclusive;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::types::{JobId, JobRecord, Placement, WorkItem};
use crate::config::PyramidConfig;
use crate::coord::{pyramid, CoordError, Corners};
use crate::queue::{enqueue_all, QueueError, WorkQueue};
use crate::render::Affine;
use crate::store::{BlobError, BlobStore, JobStore, StoreError};

/// Errors from job submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Upload is not a decodable image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Corners are collinear, so no transform exists
    #[error("corners do not span an area")]
    DegenerateCorners,

    #[error(transparent)]
    Coord(#[from] CoordError),

    /// Processing was already started for this job
    #[error("job {0} has already been started")]
    AlreadyStarted(JobId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
}

/// Creates job records and starts their processing.
pub struct JobSubmitter<S, Q, B> {
    store: Arc<S>,
    queue: Arc<Q>,
    blobs: Arc<B>,
    pyramid: PyramidConfig,
}

impl<S, Q, B> JobSubmitter<S, Q, B>
where
    S: JobStore,
    Q: WorkQueue,
    B: BlobStore,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, blobs: Arc<B>, pyramid: PyramidConfig) -> Self {
        Self {
            store,
            queue,
            blobs,
            pyramid,
        }
    }

    pub fn pyramid(&self) -> &PyramidConfig {
        &self.pyramid
    }

    /// Stores an uploaded image and creates an unstarted job for it.
    ///
    /// Only the image header is read to learn its dimensions.
    pub async fn create_job(&self, owner: &str, image: Bytes) -> Result<JobRecord, SubmitError> {
        let format =
            image::guess_format(&image).map_err(|e| SubmitError::InvalidImage(e.to_string()))?;
        let (width, height) = image::ImageReader::with_format(Cursor::new(&image[..]), format)
            .into_dimensions()
            .map_err(|e| SubmitError::InvalidImage(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(SubmitError::InvalidImage("image has no pixels".to_string()));
        }

        let blob = self
            .blobs
            .create_blob(image, format.to_mime_type())
            .await?;
        let record = JobRecord::new(JobId::generate(), owner, blob, width, height);
        self.store.put(record.clone()).await?;

        info!(
            job_id = %record.id,
            owner,
            width,
            height,
            "Created job"
        );
        Ok(record)
    }

    /// Places the job, fixes its tile total and enqueues one work item per
    /// tile.
    ///
    /// Uses the configured zoom range when `zooms` is `None`. A job can be
    /// started once; later calls fail with [`SubmitError::AlreadyStarted`].
    /// If a previous call placed the job but failed to queue its tiles, the
    /// stored placement is re-enqueued and the new arguments are ignored.
    pub async fn start(
        &self,
        job_id: &JobId,
        corners: Corners,
        zooms: Option<RangeInclusive<u8>>,
    ) -> Result<JobRecord, SubmitError> {
        let current = self.store.get(job_id).await?;
        if current.tiles_enqueued {
            return Err(SubmitError::AlreadyStarted(job_id.clone()));
        }
        if let Some(placement) = current.placement.clone() {
            warn!(job_id = %job_id, "Job placed but not queued, resuming enqueue");
            return self.finish_start(job_id, &placement).await;
        }

        let zooms = zooms.unwrap_or_else(|| self.pyramid.zoom_range());
        let transform = Affine::from_corners(&corners, current.width, current.height)
            .ok_or(SubmitError::DegenerateCorners)?;
        let tiles = pyramid(&corners, zooms.clone(), self.pyramid.max_tiles_per_zoom())?;
        let total = tiles.len() as u64;
        let placement = Placement {
            corners,
            transform,
            min_zoom: *zooms.start(),
            max_zoom: *zooms.end(),
        };

        let placed = self
            .store
            .run_in_transaction(job_id, |tx| {
                if tx.record().is_started() {
                    return Ok(false);
                }
                let record = tx.record_mut();
                record.placement = Some(placement.clone());
                record.total_tiles = total;
                Ok(true)
            })
            .await?;
        if !placed {
            return Err(SubmitError::AlreadyStarted(job_id.clone()));
        }

        self.finish_start(job_id, &placement).await
    }

    /// Queues the placement's tiles and marks the job as fully started.
    ///
    /// Re-running after a partial failure queues duplicates, which are
    /// harmless since tile commits overwrite by coordinate.
    async fn finish_start(
        &self,
        job_id: &JobId,
        placement: &Placement,
    ) -> Result<JobRecord, SubmitError> {
        let tiles = pyramid(
            &placement.corners,
            placement.min_zoom..=placement.max_zoom,
            self.pyramid.max_tiles_per_zoom(),
        )?;
        let items = tiles
            .into_iter()
            .map(|tile| WorkItem::new(job_id.clone(), tile))
            .collect();
        let queued = enqueue_all(self.queue.as_ref(), items).await?;

        let record = self
            .store
            .run_in_transaction(job_id, |tx| {
                let record = tx.record_mut();
                record.tiles_enqueued = true;
                Ok(record.clone())
            })
            .await?;

        info!(
            job_id = %job_id,
            tiles = record.total_tiles,
            queued,
            min_zoom = placement.min_zoom,
            max_zoom = placement.max_zoom,
            "Started job"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::WorldPoint;
    use crate::queue::MemoryWorkQueue;
    use crate::store::{MemoryBlobStore, MemoryJobStore};
    use crate::queue::LeasedItem;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` add calls, then defers to a memory queue.
    struct AddFailsQueue {
        inner: MemoryWorkQueue,
        failures: AtomicU32,
    }

    impl WorkQueue for AddFailsQueue {
        async fn lease_by_tag(
            &self,
            max: usize,
            tag: &JobId,
            visibility: Duration,
        ) -> Result<Vec<LeasedItem>, QueueError> {
            self.inner.lease_by_tag(max, tag, visibility).await
        }

        async fn delete(&self, items: &[LeasedItem]) -> Result<(), QueueError> {
            self.inner.delete(items).await
        }

        async fn add_batch(&self, items: Vec<WorkItem>) -> Result<(), QueueError> {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(QueueError::Transient("add failed".to_string()));
            }
            self.inner.add_batch(items).await
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    fn corners() -> Corners {
        Corners::new(
            WorldPoint::new(10.0, 10.0),
            WorldPoint::new(11.0, 10.0),
            WorldPoint::new(11.0, 11.0),
        )
    }

    fn submitter() -> (
        JobSubmitter<MemoryJobStore, MemoryWorkQueue, MemoryBlobStore>,
        Arc<MemoryWorkQueue>,
    ) {
        let queue = Arc::new(MemoryWorkQueue::new());
        let submitter = JobSubmitter::new(
            Arc::new(MemoryJobStore::new()),
            Arc::clone(&queue),
            Arc::new(MemoryBlobStore::new()),
            PyramidConfig::default(),
        );
        (submitter, queue)
    }

    #[tokio::test]
    async fn test_create_job_reads_dimensions() {
        let (submitter, _) = submitter();
        let record = submitter.create_job("alice", png(6, 3)).await.unwrap();

        assert_eq!((record.width, record.height), (6, 3));
        assert_eq!(record.owner, "alice");
        assert!(!record.is_started());
    }

    #[tokio::test]
    async fn test_create_job_rejects_garbage() {
        let (submitter, _) = submitter();
        let result = submitter
            .create_job("alice", Bytes::from_static(b"not an image"))
            .await;
        assert!(matches!(result, Err(SubmitError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_start_enqueues_every_tile() {
        let (submitter, queue) = submitter();
        let record = submitter.create_job("alice", png(4, 4)).await.unwrap();

        let started = submitter
            .start(&record.id, corners(), Some(0..=8))
            .await
            .unwrap();

        // Zooms 0..=7 need one tile each; zoom 8 spans tiles 10..=11 on both axes.
        assert_eq!(started.total_tiles, 8 + 4);
        assert_eq!(queue.remaining(&record.id), 12);
        assert!(started.placement.is_some());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (submitter, queue) = submitter();
        let record = submitter.create_job("alice", png(4, 4)).await.unwrap();
        submitter
            .start(&record.id, corners(), Some(0..=1))
            .await
            .unwrap();

        let again = submitter.start(&record.id, corners(), Some(0..=1)).await;

        assert!(matches!(again, Err(SubmitError::AlreadyStarted(_))));
        assert_eq!(queue.remaining(&record.id), 2);
    }

    #[tokio::test]
    async fn test_start_rejects_collinear_corners() {
        let (submitter, _) = submitter();
        let record = submitter.create_job("alice", png(4, 4)).await.unwrap();
        let flat = Corners::new(
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(1.0, 0.0),
            WorldPoint::new(2.0, 0.0),
        );

        let result = submitter.start(&record.id, flat, Some(0..=1)).await;
        assert!(matches!(result, Err(SubmitError::DegenerateCorners)));
    }

    #[tokio::test]
    async fn test_start_resumes_after_enqueue_failure() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(AddFailsQueue {
            inner: MemoryWorkQueue::new(),
            failures: AtomicU32::new(1),
        });
        let submitter = JobSubmitter::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::new(MemoryBlobStore::new()),
            PyramidConfig::default(),
        );
        let record = submitter.create_job("alice", png(4, 4)).await.unwrap();

        let first = submitter.start(&record.id, corners(), Some(8..=8)).await;
        assert!(matches!(first, Err(SubmitError::Queue(QueueError::Transient(_)))));
        let placed = store.get(&record.id).await.unwrap();
        assert!(placed.is_started());
        assert!(!placed.tiles_enqueued);
        assert_eq!(queue.inner.remaining(&record.id), 0);

        let retried = submitter
            .start(&record.id, corners(), Some(8..=8))
            .await
            .unwrap();
        assert!(retried.tiles_enqueued);
        assert_eq!(retried.total_tiles, 4);
        assert_eq!(queue.inner.remaining(&record.id), 4);

        let again = submitter.start(&record.id, corners(), Some(8..=8)).await;
        assert!(matches!(again, Err(SubmitError::AlreadyStarted(_))));
        assert_eq!(queue.inner.remaining(&record.id), 4);
    }
}
