//! Typed publish/subscribe channels.
//!
//! One channel per event type rather than ad hoc listener lists: publishers
//! hold an [`EventChannel`], subscribers hold a receiver, and dropping the
//! receiver is the unsubscribe.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// A broadcast channel carrying one event type.
pub struct EventChannel<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> EventChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. Publishing with no subscribers is
    /// not an error; the event is simply dropped. Returns the number of
    /// subscribers the event reached.
    pub fn publish(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let channel: EventChannel<Ping> = EventChannel::default();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        assert_eq!(channel.publish(Ping(1)), 2);
        assert_eq!(a.recv().await.unwrap(), Ping(1));
        assert_eq!(b.recv().await.unwrap(), Ping(1));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let channel: EventChannel<Ping> = EventChannel::default();
        assert_eq!(channel.publish(Ping(1)), 0);
    }

    #[tokio::test]
    async fn dropping_the_receiver_unsubscribes() {
        let channel: EventChannel<Ping> = EventChannel::default();
        let rx = channel.subscribe();
        assert_eq!(channel.receiver_count(), 1);
        drop(rx);
        assert_eq!(channel.receiver_count(), 0);
        assert_eq!(channel.publish(Ping(2)), 0);
    }
}
