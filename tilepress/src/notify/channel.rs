//! Notification channel implementations.

use tokio::sync::broadcast;
use tracing::{info, trace};

use super::{NotificationChannel, NotifyError};

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChannel;

impl NotificationChannel for NullChannel {
    async fn send(&self, _subscriber: &str, _payload: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChannel;

impl NotificationChannel for TracingChannel {
    async fn send(&self, subscriber: &str, payload: &str) -> Result<(), NotifyError> {
        info!(subscriber, payload, "notification");
        Ok(())
    }
}

/// A notification delivered through a [`BroadcastChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subscriber: String,
    pub payload: String,
}

/// Fans notifications out to in-process receivers.
///
/// Sending with no receivers attached is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationChannel for BroadcastChannel {
    async fn send(&self, subscriber: &str, payload: &str) -> Result<(), NotifyError> {
        let notification = Notification {
            subscriber: subscriber.to_string(),
            payload: payload.to_string(),
        };
        if self.tx.send(notification).is_err() {
            trace!(subscriber, "no receivers for notification");
        }
        Ok(())
    }
}
