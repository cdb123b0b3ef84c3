//! Tiling jobs.
//!
//! A job is created when an image is uploaded and started once its
//! placement is known. Starting fixes the tile total and fans out one
//! [`WorkItem`] per tile into the work queue.
//!
//! # Archive lifecycle
//!
//! ```text
//! Empty ──(completion gate, once)──► Pending ──(assembler)──► Ready(blob)
//! ```

mod submit;
mod types;

pub use submit::{JobSubmitter, SubmitError};
pub use types::{
    ArchiveState, ArchiveTrigger, JobId, JobRecord, Placement, RenderedTile, TransitionError,
    WorkItem,
};
