//! Event bus with bounded per-subscriber queues
//!
//! Publishing never waits on a subscriber. A subscriber whose queue is full or
//! whose receiver has been dropped is removed from the bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::types::{Event, EventEnvelope};

/// Per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<EventEnvelope>,
}

#[derive(Default)]
struct Inner {
    next_subscriber_id: u64,
    sequence: u64,
    subscribers: Vec<Subscriber>,
}

/// Event bus for publishing and subscribing to events
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
    queue_capacity: usize,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a new event bus with default queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a new event bus whose subscribers buffer up to `queue_capacity` events
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            queue_capacity: queue_capacity.max(1),
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event to all subscribers
    ///
    /// The event is stamped with the next sequence number and enqueued for every
    /// subscriber while the bus lock is held, so all subscribers see the same
    /// order. Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let mut inner = self.lock();
        inner.sequence += 1;
        let envelope = EventEnvelope::new(inner.sequence, event);
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        inner.subscribers.retain(|subscriber| {
            match subscriber.sender.try_send(envelope.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = subscriber.id,
                        sequence = envelope.sequence,
                        "Subscriber queue full, dropping subscriber"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        delivered
    }

    /// Subscribe to events
    ///
    /// Events published before subscribing will not be received.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let mut inner = self.lock();
        inner.next_subscriber_id += 1;
        let id = inner.next_subscriber_id;
        inner.subscribers.push(Subscriber { id, sender });
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.retain(|subscriber| subscriber.id != id);
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

/// Receiving side of one bus subscription
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<EventEnvelope>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the bus has dropped this subscriber
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<EventEnvelope> {
        ReceiverStream::new(self.receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(task_id: &str) -> Event {
        Event::TaskStarted {
            task_id: task_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let sent = bus.publish(started("t1"));
        assert_eq!(sent, 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received.task_id(), "t1");
        assert_eq!(received.sequence, 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_share_order() {
        let bus = EventBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.publish(started("a")), 2);
        assert_eq!(bus.publish(started("b")), 2);

        for sub in [&mut sub1, &mut sub2] {
            let first = sub.recv().await.unwrap();
            let second = sub.recv().await.unwrap();
            assert_eq!(first.task_id(), "a");
            assert_eq!(second.task_id(), "b");
            assert!(first.sequence < second.sequence);
        }
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::new();

        // No subscribers, event is dropped
        assert_eq!(bus.publish(started("t1")), 0);
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let bus = EventBus::new();
        bus.publish(started("early"));

        let mut sub = bus.subscribe();
        assert!(sub.try_recv().is_none());

        bus.publish(started("late"));
        assert_eq!(sub.recv().await.unwrap().task_id(), "late");
    }

    #[tokio::test]
    async fn test_full_subscriber_is_dropped() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        bus.publish(started("1"));
        bus.publish(started("2"));
        fast.recv().await.unwrap();
        fast.recv().await.unwrap();

        // Slow subscriber's queue is full; it is dropped, fast still receives.
        assert_eq!(bus.publish(started("3")), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(fast.recv().await.unwrap().task_id(), "3");

        // Slow drains what it buffered and then sees the end of the stream.
        assert_eq!(slow.recv().await.unwrap().task_id(), "1");
        assert_eq!(slow.recv().await.unwrap().task_id(), "2");
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed_on_publish() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.publish(started("t1")), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.unsubscribe(sub.id());
        bus.unsubscribe(sub.id());
        bus.unsubscribe(999);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clone() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _sub = bus2.subscribe();
        assert_eq!(bus1.subscriber_count(), 1);
        assert_eq!(bus2.subscriber_count(), 1);
    }
}
