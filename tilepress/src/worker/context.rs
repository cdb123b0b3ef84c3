//! Per-run render context.

use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use crate::error::PipelineError;
use crate::job::{JobId, JobRecord, Placement};
use crate::render::Affine;
use crate::store::{BlobStore, JobStore};

/// A started job together with its decoded source image.
///
/// Loaded once per orchestrator run and shared by every batch.
#[derive(Debug, Clone)]
pub struct RenderContext {
    record: JobRecord,
    placement: Placement,
    source: Arc<RgbaImage>,
}

impl RenderContext {
    /// Builds a context from an already decoded image.
    pub fn new(record: JobRecord, source: RgbaImage) -> Result<Self, PipelineError> {
        let placement = record
            .placement
            .clone()
            .ok_or_else(|| PipelineError::NotStarted(record.id.clone()))?;
        Ok(Self {
            record,
            placement,
            source: Arc::new(source),
        })
    }

    /// Reads the job record and decodes its source image off the runtime.
    pub async fn load<S, B>(store: &S, blobs: &B, job_id: &JobId) -> Result<Self, PipelineError>
    where
        S: JobStore,
        B: BlobStore,
    {
        let record = store.get(job_id).await?;
        if !record.is_started() {
            return Err(PipelineError::NotStarted(job_id.clone()));
        }
        let blob = blobs.read_blob(&record.image).await?;

        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&blob.data).map(|img| img.to_rgba8())
        })
        .await?;
        let source = decoded.map_err(|e| PipelineError::SourceImage {
            job_id: job_id.clone(),
            message: e.to_string(),
        })?;

        debug!(
            job_id = %job_id,
            width = source.width(),
            height = source.height(),
            "Loaded source image"
        );
        Self::new(record, source)
    }

    pub fn job_id(&self) -> &JobId {
        &self.record.id
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn total_tiles(&self) -> u64 {
        self.record.total_tiles
    }

    pub fn transform(&self) -> Affine {
        self.placement.transform
    }

    pub fn source(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.source)
    }
}
