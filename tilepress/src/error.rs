//! Error types for the tiling pipeline.
//!
//! Component errors ([`QueueError`], [`StoreError`], [`RenderError`],
//! [`BlobError`]) are aggregated into [`PipelineError`], which decides what
//! the retry loop may absorb.

use thiserror::Error;

use crate::job::JobId;
use crate::queue::QueueError;
use crate::render::RenderError;
use crate::store::{BlobError, StoreError};

/// Errors from archive assembly.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Job is not waiting for an archive
    #[error("job {job_id} has archive state '{state}', expected pending")]
    NotPending { job_id: JobId, state: &'static str },

    /// Writing the zip failed
    #[error("failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing an entry body failed
    #[error("failed to write archive entry: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while processing a job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Source image could not be decoded
    #[error("failed to decode source image for job {job_id}: {message}")]
    SourceImage { job_id: JobId, message: String },

    /// Job has no placement yet
    #[error("job {0} has not started processing")]
    NotStarted(JobId),

    /// Run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Internal error (e.g., a task panicked)
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the retry loop may back off and try again.
    ///
    /// Transient queue and store failures are retryable. Render failures,
    /// archive failures and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Queue(e) => e.is_retryable(),
            PipelineError::Store(e) => e.is_retryable(),
            PipelineError::Blob(BlobError::Unavailable(_)) => true,
            PipelineError::Blob(_)
            | PipelineError::Render(_)
            | PipelineError::Archive(_)
            | PipelineError::SourceImage { .. }
            | PipelineError::NotStarted(_)
            | PipelineError::Cancelled
            | PipelineError::Internal(_) => false,
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::Internal(format!("task failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::from(QueueError::Transient("timeout".into())).is_retryable());
        assert!(PipelineError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!PipelineError::from(RenderError::Failed {
            tile: TileCoord::new(0, 0, 0),
            message: "bad".into(),
        })
        .is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
        assert!(!PipelineError::from(StoreError::NotFound(JobId::new("j"))).is_retryable());
    }
}
