//! Progress notifications.
//!
//! Pipeline stages emit progress events through a [`NotificationEmitter`];
//! how they reach a subscriber is up to the [`NotificationChannel`]. Delivery
//! is best-effort: a failed send is logged and forgotten, and never changes
//! the outcome of the stage that emitted it. Sends that do not finish within
//! the emitter's send timeout are abandoned so a stalled channel cannot hold
//! up a tile commit.
//!
//! # Wire format
//!
//! Each event is one JSON object:
//!
//! ```text
//! {"total":24,"ids":["3,5,4","3,6,4"],"tilesDone":false,"zipDone":false}
//! ```
//!
//! Exactly one of `ids`, `tilesDone` and `zipDone` carries information in a
//! given event.

mod channel;

pub use channel::{BroadcastChannel, Notification, NullChannel, TracingChannel};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::job::JobId;

/// Errors from notification channels.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Progress event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    pub total: u64,
    pub ids: Vec<String>,
    pub tiles_done: bool,
    pub zip_done: bool,
}

impl ProgressMessage {
    /// Tiles just committed, with the job's total for progress display.
    pub fn tiles(total: u64, ids: Vec<String>) -> Self {
        Self {
            total,
            ids,
            tiles_done: false,
            zip_done: false,
        }
    }

    /// Every tile of the job is stored.
    pub fn tiles_done() -> Self {
        Self {
            total: 0,
            ids: Vec::new(),
            tiles_done: true,
            zip_done: false,
        }
    }

    /// The download archive is ready.
    pub fn archive_ready() -> Self {
        Self {
            total: 0,
            ids: Vec::new(),
            tiles_done: false,
            zip_done: true,
        }
    }

    /// Decodes a payload produced by [`NotificationEmitter`].
    pub fn from_payload(payload: &str) -> Result<Self, NotifyError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Default upper bound on a single notification send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport for serialized progress events.
pub trait NotificationChannel: Send + Sync + 'static {
    /// Delivers `payload` to `subscriber`.
    fn send(
        &self,
        subscriber: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Best-effort progress emitter.
///
/// A job's subscriber is identified by the job id itself.
pub struct NotificationEmitter<C> {
    channel: Arc<C>,
    send_timeout: Duration,
}

impl<C> Clone for NotificationEmitter<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            send_timeout: self.send_timeout,
        }
    }
}

impl<C: NotificationChannel> NotificationEmitter<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Sets how long one send may take before it is abandoned.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Announces newly stored tiles. Skipped when `tile_ids` is empty.
    pub async fn emit_progress(&self, job_id: &JobId, total: u64, tile_ids: Vec<String>) {
        if tile_ids.is_empty() {
            debug!(job_id = %job_id, "no tile ids; skipping progress notification");
            return;
        }
        self.send(job_id, ProgressMessage::tiles(total, tile_ids)).await;
    }

    /// Announces that every tile is stored.
    pub async fn emit_tiles_done(&self, job_id: &JobId) {
        self.send(job_id, ProgressMessage::tiles_done()).await;
    }

    /// Announces that the download archive is ready.
    pub async fn emit_archive_ready(&self, job_id: &JobId) {
        self.send(job_id, ProgressMessage::archive_ready()).await;
    }

    async fn send(&self, job_id: &JobId, message: ProgressMessage) {
        let subscriber = job_id.as_str();
        if subscriber.is_empty() {
            debug!("no subscriber; skipping notification");
            return;
        }

        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to encode notification");
                return;
            }
        };

        match tokio::time::timeout(self.send_timeout, self.channel.send(subscriber, &payload)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Failed to send notification");
            }
            Err(_) => {
                warn!(
                    job_id = %job_id,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Notification send timed out"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl NotificationChannel for RecordingChannel {
        async fn send(&self, subscriber: &str, payload: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("subscriber gone".into()));
            }
            self.sent
                .lock()
                .push((subscriber.to_string(), payload.to_string()));
            Ok(())
        }
    }

    /// A channel whose sends never complete.
    struct StalledChannel;

    impl NotificationChannel for StalledChannel {
        async fn send(&self, _subscriber: &str, _payload: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_wire_format() {
        let json =
            serde_json::to_string(&ProgressMessage::tiles(24, vec!["3,5,4".into()])).unwrap();
        assert_eq!(
            json,
            r#"{"total":24,"ids":["3,5,4"],"tilesDone":false,"zipDone":false}"#
        );

        let done = ProgressMessage::from_payload(
            r#"{"total":0,"ids":[],"tilesDone":false,"zipDone":true}"#,
        )
        .unwrap();
        assert_eq!(done, ProgressMessage::archive_ready());
        assert!(ProgressMessage::from_payload("{").is_err());
    }

    #[tokio::test]
    async fn test_emit_progress_sends_to_job_subscriber() {
        let channel = Arc::new(RecordingChannel::default());
        let emitter = NotificationEmitter::new(Arc::clone(&channel));

        emitter
            .emit_progress(&JobId::new("overlay-1"), 4, vec!["0,0,1".into()])
            .await;

        let sent = channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "overlay-1");
        assert!(sent[0].1.contains(r#""ids":["0,0,1"]"#));
    }

    #[tokio::test]
    async fn test_empty_ids_and_subscriber_are_skipped() {
        let channel = Arc::new(RecordingChannel::default());
        let emitter = NotificationEmitter::new(Arc::clone(&channel));

        emitter.emit_progress(&JobId::new("j"), 4, Vec::new()).await;
        emitter.emit_tiles_done(&JobId::new("")).await;

        assert!(channel.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let channel = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let emitter = NotificationEmitter::new(channel);

        // Must return normally.
        emitter.emit_archive_ready(&JobId::new("j")).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_channel_is_abandoned_after_timeout() {
        let emitter = NotificationEmitter::new(Arc::new(StalledChannel))
            .with_send_timeout(Duration::from_millis(100));
        let started = tokio::time::Instant::now();

        emitter
            .emit_progress(&JobId::new("overlay-1"), 4, vec!["0,0,1".into()])
            .await;
        emitter.emit_archive_ready(&JobId::new("overlay-1")).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < DEFAULT_SEND_TIMEOUT);
    }
}
