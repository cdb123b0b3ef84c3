//! Job, work item and rendered tile records.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::coord::{Corners, TileCoord};
use crate::render::Affine;
use crate::store::BlobRef;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a tiling job.
///
/// Also used as the work queue tag for the job's items and as the
/// notification subscriber id.
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a process-unique id of the form `overlay-{n}`.
    pub fn generate() -> Self {
        let n = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("overlay-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Archive state
// ============================================================================

/// Lifecycle of a job's download archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArchiveState {
    /// Tiles still being produced, no archive requested
    #[default]
    Empty,
    /// Archive trigger enqueued, assembly not finished
    Pending,
    /// Archive stored
    Ready(BlobRef),
}

impl ArchiveState {
    /// Short label for logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            ArchiveState::Empty => "empty",
            ArchiveState::Pending => "pending",
            ArchiveState::Ready(_) => "ready",
        }
    }

    /// Validates a transition and returns the next state.
    ///
    /// Only `Empty -> Pending` and `Pending -> Ready` are allowed.
    pub fn advance(&self, next: ArchiveState) -> Result<ArchiveState, TransitionError> {
        match (self, &next) {
            (ArchiveState::Empty, ArchiveState::Pending) => Ok(next),
            (ArchiveState::Pending, ArchiveState::Ready(_)) => Ok(next),
            (ArchiveState::Empty, ArchiveState::Empty)
            | (ArchiveState::Empty, ArchiveState::Ready(_))
            | (ArchiveState::Pending, ArchiveState::Empty)
            | (ArchiveState::Pending, ArchiveState::Pending)
            | (ArchiveState::Ready(_), _) => Err(TransitionError {
                from: self.label(),
                to: next.label(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ArchiveState::Ready(_))
    }
}

/// Rejected archive state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid archive transition {from} -> {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

// ============================================================================
// Job record
// ============================================================================

/// Where an overlay sits and which zoom levels are produced.
///
/// Fixed once processing starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub corners: Corners,
    /// World to source-pixel transform
    pub transform: Affine,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

/// One tiling request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub owner: String,
    /// Source image blob
    pub image: BlobRef,
    pub width: u32,
    pub height: u32,
    /// `None` until processing has started
    pub placement: Option<Placement>,
    /// Number of tiles in the pyramid, set once at processing start
    pub total_tiles: u64,
    /// Set once every work item for the pyramid has been queued
    pub tiles_enqueued: bool,
    pub archive: ArchiveState,
}

impl JobRecord {
    /// Creates a record for an uploaded image that has not been placed yet.
    pub fn new(id: JobId, owner: impl Into<String>, image: BlobRef, width: u32, height: u32) -> Self {
        Self {
            id,
            owner: owner.into(),
            image,
            width,
            height,
            placement: None,
            total_tiles: 0,
            tiles_enqueued: false,
            archive: ArchiveState::Empty,
        }
    }

    pub fn is_started(&self) -> bool {
        self.placement.is_some()
    }
}

// ============================================================================
// Work items and results
// ============================================================================

/// A unit of work: render one tile of one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub job_id: JobId,
    pub tile: TileCoord,
}

impl WorkItem {
    pub fn new(job_id: JobId, tile: TileCoord) -> Self {
        Self { job_id, tile }
    }
}

/// Encoded output for one tile, keyed by job and coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTile {
    pub job_id: JobId,
    pub tile: TileCoord,
    pub image: Bytes,
}

/// Request to assemble a job's archive, delivered through the store outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTrigger {
    pub job_id: JobId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_state_forward_transitions() {
        let pending = ArchiveState::Empty.advance(ArchiveState::Pending).unwrap();
        assert_eq!(pending, ArchiveState::Pending);

        let blob = BlobRef::new("blob-1");
        let ready = pending.advance(ArchiveState::Ready(blob.clone())).unwrap();
        assert_eq!(ready, ArchiveState::Ready(blob));
    }

    #[test]
    fn test_archive_state_rejects_skips_and_regressions() {
        let blob = BlobRef::new("blob-1");
        assert!(ArchiveState::Empty
            .advance(ArchiveState::Ready(blob.clone()))
            .is_err());
        assert!(ArchiveState::Pending.advance(ArchiveState::Pending).is_err());
        assert!(ArchiveState::Pending.advance(ArchiveState::Empty).is_err());

        let err = ArchiveState::Ready(blob.clone())
            .advance(ArchiveState::Ready(blob))
            .unwrap_err();
        assert_eq!(err.from, "ready");
        assert_eq!(err.to, "ready");
    }

    #[test]
    fn test_job_id_generate_is_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("overlay-"));
    }

    #[test]
    fn test_new_record_is_unstarted() {
        let record = JobRecord::new(JobId::new("j"), "alice", BlobRef::new("img"), 10, 20);
        assert!(!record.is_started());
        assert_eq!(record.total_tiles, 0);
        assert_eq!(record.archive, ArchiveState::Empty);
    }
}
