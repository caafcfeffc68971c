//! Status notifications.
//!
//! Publishing is fire-and-forget: a missing or lagging subscriber never
//! affects a run. Events are not replayed to late subscribers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{Photo, PhotoId, PhotoStatus};

/// A status transition, published after it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoEvent {
    pub photo_id: PhotoId,
    pub status: PhotoStatus,
    pub error_message: Option<String>,
    pub reference_object: Option<String>,
    pub at: DateTime<Utc>,
}

impl From<&Photo> for PhotoEvent {
    fn from(photo: &Photo) -> Self {
        Self {
            photo_id: photo.id(),
            status: photo.status(),
            error_message: photo.error_message().map(str::to_owned),
            reference_object: photo.reference_object().map(str::to_owned),
            at: Utc::now(),
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Deliver `event` to whoever is listening for its photo.
    fn publish(&self, event: PhotoEvent);
}

/// One broadcast channel per subscribed photo.
#[derive(Debug)]
pub struct BroadcastNotifier {
    channels: Mutex<HashMap<PhotoId, broadcast::Sender<PhotoEvent>>>,
    capacity: usize,
}

impl BroadcastNotifier {
    /// Buffered events per photo before slow receivers start lagging.
    pub const DEFAULT_CAPACITY: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receive every event published for `photo_id` from now on.
    ///
    /// Channels whose receivers have all been dropped are pruned here.
    pub fn subscribe(&self, photo_id: PhotoId) -> broadcast::Receiver<PhotoEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(photo_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

#[cfg(test)]
impl BroadcastNotifier {
    fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: PhotoEvent) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let photo_id = event.photo_id;
        let terminal = event.status.is_terminal();
        let Some(sender) = channels.get(&photo_id) else {
            return;
        };
        // No receivers left, or nothing more will be sent: drop the channel.
        if sender.send(event).is_err() || terminal {
            channels.remove(&photo_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(photo_id: PhotoId, status: PhotoStatus) -> PhotoEvent {
        PhotoEvent {
            photo_id,
            status,
            error_message: None,
            reference_object: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let notifier = BroadcastNotifier::new();
        let id = PhotoId::new();
        let mut rx = notifier.subscribe(id);

        notifier.publish(event(id, PhotoStatus::Processing));
        notifier.publish(event(id, PhotoStatus::Completed));

        assert_eq!(rx.recv().await.unwrap().status, PhotoStatus::Processing);
        assert_eq!(rx.recv().await.unwrap().status, PhotoStatus::Completed);
    }

    #[tokio::test]
    async fn events_are_keyed_by_photo() {
        let notifier = BroadcastNotifier::new();
        let a = PhotoId::new();
        let b = PhotoId::new();
        let mut rx = notifier.subscribe(a);

        notifier.publish(event(b, PhotoStatus::Processing));
        notifier.publish(event(a, PhotoStatus::Failed));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.photo_id, a);
        assert_eq!(received.status, PhotoStatus::Failed);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let notifier = BroadcastNotifier::new();
        notifier.publish(event(PhotoId::new(), PhotoStatus::Processing));
    }

    #[test]
    fn abandoned_channels_are_pruned_on_subscribe() {
        let notifier = BroadcastNotifier::new();
        let finished = PhotoId::new();
        let unknown = PhotoId::new();

        drop(notifier.subscribe(finished));
        drop(notifier.subscribe(unknown));
        let _live = notifier.subscribe(PhotoId::new());

        assert_eq!(notifier.open_channels(), 1);
    }

    #[tokio::test]
    async fn channel_closes_after_terminal_event() {
        let notifier = BroadcastNotifier::new();
        let id = PhotoId::new();
        let mut rx = notifier.subscribe(id);
        notifier.publish(event(id, PhotoStatus::Completed));

        assert_eq!(rx.recv().await.unwrap().status, PhotoStatus::Completed);
        let closed = rx.recv().await;
        assert!(matches!(closed, Err(broadcast::error::RecvError::Closed)));
    }
}
