//! ProgressHub — in-process pub/sub used to push upload-progress events to
//! connected clients. Channels are keyed by an opaque subscriber id (the
//! `socketId` the front end sends with its upload request); delivery is
//! fire-and-forget so a gone subscriber can never stall the byte pipeline.

use crate::models::progress::ProgressEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered events per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// One published message: the event name plus its payload.
#[derive(Clone, Debug)]
pub struct ChannelMessage {
    pub event: String,
    pub payload: ProgressEvent,
}

/// Narrow publish capability handed to the upload pipeline.
///
/// Conceptually `channel.to(subscriber_id).emit(event, payload)`. Publishing
/// must never block and must never fail fatally.
pub trait ProgressPublisher: Send + Sync {
    fn publish(&self, subscriber_id: &str, event: &str, payload: ProgressEvent);
}

/// Broadcast-channel implementation of [`ProgressPublisher`].
///
/// One `tokio::sync::broadcast` channel per subscriber id, created lazily on
/// first subscribe or publish. The map is guarded by a plain mutex; it is
/// only held for channel lookup, never across an await point.
#[derive(Debug, Default)]
pub struct ProgressHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a subscriber id, creating its channel if needed.
    pub fn subscribe(&self, subscriber_id: &str) -> broadcast::Receiver<ChannelMessage> {
        self.sender(subscriber_id).subscribe()
    }

    fn sender(&self, subscriber_id: &str) -> broadcast::Sender<ChannelMessage> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(subscriber_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Drop a channel that has no receivers left.
    fn prune(&self, subscriber_id: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(subscriber_id) {
            if sender.receiver_count() == 0 {
                channels.remove(subscriber_id);
            }
        }
    }
}

impl ProgressPublisher for ProgressHub {
    fn publish(&self, subscriber_id: &str, event: &str, payload: ProgressEvent) {
        let sender = self.sender(subscriber_id);
        let message = ChannelMessage {
            event: event.to_string(),
            payload,
        };
        if sender.send(message).is_err() {
            trace!(subscriber = %subscriber_id, "no receivers for progress event");
            self.prune(subscriber_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::ON_UPLOAD_EVENT;

    fn event(bytes: u64) -> ProgressEvent {
        ProgressEvent {
            processed_already: bytes,
            filename: "filename.txt".into(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_a_subscriber() {
        let hub = ProgressHub::new();
        let mut rx = hub.subscribe("10");

        hub.publish("10", ON_UPLOAD_EVENT, event(5));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.event, ON_UPLOAD_EVENT);
        assert_eq!(message.payload, event(5));
    }

    #[tokio::test]
    async fn publish_is_scoped_to_one_subscriber() {
        let hub = ProgressHub::new();
        let mut interested = hub.subscribe("a");
        let mut other = hub.subscribe("b");

        hub.publish("a", ON_UPLOAD_EVENT, event(1));

        assert!(interested.recv().await.is_ok());
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = ProgressHub::new();
        hub.publish("nobody", ON_UPLOAD_EVENT, event(1));
        // the dead channel was pruned again
        assert!(hub.channels.lock().unwrap().is_empty());
    }
}
