//! Tile workers and the completion/archive pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ RetryOrchestrator (one per worker per job)                   │
//! │                                                              │
//! │   BatchWorker ── lease ──► WorkQueue                         │
//! │       │  render (spawn_blocking) ──► TileRenderer             │
//! │       └─ commit ──► JobStore.put_tiles + WorkQueue.delete     │
//! │                                                              │
//! │   CompletionGate ── transaction ──► JobStore                 │
//! │       └─ Empty → Pending + ArchiveTrigger (outbox, once)      │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ outbox
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ArchiveDispatcher ──► ArchiveAssembler                       │
//! │       zip(tiles + index.html) ──► BlobStore                   │
//! │       Pending → Ready(blob)                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Progress (tile ids, tiles done, archive ready) flows through the
//! [`NotificationEmitter`](crate::notify::NotificationEmitter) at each step.

mod archive;
mod batch;
mod context;
mod dispatcher;
mod gate;
mod index;
mod retry;

pub use archive::{build_archive, ArchiveAssembler, ARCHIVE_CONTENT_TYPE};
pub use batch::{BatchReport, BatchWorker};
pub use context::RenderContext;
pub use dispatcher::{ArchiveDispatcher, DEFAULT_POLL_INTERVAL};
pub use gate::{CompletionGate, Evaluation};
pub use index::{HtmlIndex, IndexDocument};
pub use retry::{RetryOrchestrator, RunSummary};
