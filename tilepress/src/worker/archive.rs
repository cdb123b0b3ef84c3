//! Archive assembly.
//!
//! Packages every stored tile of a finished job into one zip:
//!
//! ```text
//! {job_id}/index.html
//! {job_id}/{zoom}/{x}/{y}.png      (ordered by zoom, x, y)
//! ```
//!
//! The zip is stored as a blob and the job moves from `Pending` to
//! `Ready(blob)`. A failure leaves the job `Pending`; it is not retried
//! automatically.

use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::index::{HtmlIndex, IndexDocument};
use crate::error::{ArchiveError, PipelineError};
use crate::job::{ArchiveState, JobId, RenderedTile};
use crate::notify::{NotificationChannel, NotificationEmitter};
use crate::store::{BlobRef, BlobStore, JobStore};

/// Content type of stored archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Builds and stores the download archive for a job.
pub struct ArchiveAssembler<S, B, C, I = HtmlIndex> {
    store: Arc<S>,
    blobs: Arc<B>,
    emitter: NotificationEmitter<C>,
    index: Arc<I>,
}

impl<S, B, C, I> Clone for ArchiveAssembler<S, B, C, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            emitter: self.emitter.clone(),
            index: Arc::clone(&self.index),
        }
    }
}

impl<S, B, C> ArchiveAssembler<S, B, C, HtmlIndex>
where
    S: JobStore,
    B: BlobStore,
    C: NotificationChannel,
{
    /// Creates an assembler using the default HTML index page.
    pub fn new(store: Arc<S>, blobs: Arc<B>, emitter: NotificationEmitter<C>) -> Self {
        Self::with_index(store, blobs, emitter, Arc::new(HtmlIndex))
    }
}

impl<S, B, C, I> ArchiveAssembler<S, B, C, I>
where
    S: JobStore,
    B: BlobStore,
    C: NotificationChannel,
    I: IndexDocument,
{
    pub fn with_index(
        store: Arc<S>,
        blobs: Arc<B>,
        emitter: NotificationEmitter<C>,
        index: Arc<I>,
    ) -> Self {
        Self {
            store,
            blobs,
            emitter,
            index,
        }
    }

    /// Assembles the archive for a `Pending` job.
    ///
    /// Returns the existing blob without rebuilding if the job is already
    /// `Ready`. Fails with [`ArchiveError::NotPending`] for an `Empty` job.
    pub async fn assemble(&self, job_id: &JobId) -> Result<BlobRef, PipelineError> {
        let record = self.store.get(job_id).await?;
        match &record.archive {
            ArchiveState::Pending => {}
            ArchiveState::Ready(blob) => {
                debug!(job_id = %job_id, blob = %blob, "Archive already assembled");
                return Ok(blob.clone());
            }
            ArchiveState::Empty => {
                return Err(ArchiveError::NotPending {
                    job_id: job_id.clone(),
                    state: record.archive.label(),
                }
                .into());
            }
        }
        let placement = record
            .placement
            .clone()
            .ok_or_else(|| PipelineError::NotStarted(job_id.clone()))?;

        let tiles = self.store.tiles_for_job(job_id).await?;
        let tile_count = tiles.len();
        let index = self.index.render(&record, &placement);

        let prefix = job_id.clone();
        let archive =
            tokio::task::spawn_blocking(move || build_archive(&prefix, &tiles, &index)).await??;
        let archive_len = archive.len();

        let blob = self
            .blobs
            .create_blob(Bytes::from(archive), ARCHIVE_CONTENT_TYPE)
            .await?;

        let stored = self
            .store
            .run_in_transaction(job_id, |tx| {
                // Lost a race with another assembler; keep the first archive.
                if let ArchiveState::Ready(existing) = &tx.record().archive {
                    return Ok(existing.clone());
                }
                let next = tx
                    .record()
                    .archive
                    .advance(ArchiveState::Ready(blob.clone()))?;
                tx.record_mut().archive = next;
                Ok(blob.clone())
            })
            .await?;

        info!(
            job_id = %job_id,
            tiles = tile_count,
            bytes = archive_len,
            blob = %stored,
            "Archive ready"
        );
        self.emitter.emit_archive_ready(job_id).await;
        Ok(stored)
    }
}

/// Writes tiles and the index page into an in-memory zip.
///
/// PNG data is already compressed, so tiles are stored; the index is
/// deflated.
pub fn build_archive(
    job_id: &JobId,
    tiles: &[RenderedTile],
    index_html: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for tile in tiles {
        let name = format!(
            "{}/{}/{}/{}.png",
            job_id, tile.tile.zoom, tile.tile.x, tile.tile.y
        );
        zip.start_file(name, entry_options(CompressionMethod::Stored))?;
        zip.write_all(&tile.image)?;
    }

    zip.start_file(
        format!("{}/index.html", job_id),
        entry_options(CompressionMethod::Deflated),
    )?;
    zip.write_all(index_html.as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}
