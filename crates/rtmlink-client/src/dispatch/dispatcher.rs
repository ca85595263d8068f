use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::event::SessionEvent;

pub type SubscriptionId = u64;

/// Push-style consumer, driven on its own task so it cannot stall the read loop.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    async fn on_event(&self, event: Arc<SessionEvent>);
}

/// Pull-style subscription returned by `EventDispatcher::subscribe`.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<SessionEvent>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Arc<SessionEvent>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<SessionEvent>> {
        self.rx.try_recv().ok()
    }
}

/// Fans events out to every subscriber through a bounded queue each.
///
/// `publish` never waits: a subscriber whose queue is full misses that event
/// (counted in `dropped_count`), and one whose receiver is gone is pruned.
pub struct EventDispatcher {
    subscribers: DashMap<SubscriptionId, mpsc::Sender<Arc<SessionEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn add_sender(&self) -> (SubscriptionId, mpsc::Receiver<Arc<SessionEvent>>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn subscribe(&self) -> Subscription {
        let (id, rx) = self.add_sender();
        tracing::debug!(subscription = id, "subscriber added");
        Subscription { id, rx }
    }

    /// Register a push consumer. Must be called within a tokio runtime.
    pub fn subscribe_consumer(&self, consumer: Arc<dyn EventConsumer>) -> SubscriptionId {
        let (id, mut rx) = self.add_sender();
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                consumer.on_event(ev).await;
            }
            tracing::debug!(subscription = id, "consumer task finished");
        });
        tracing::debug!(subscription = id, "consumer added");
        id
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Events dropped because a subscriber's queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn publish(&self, event: SessionEvent) {
        let ev = Arc::new(event);
        let mut gone = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(subscription = *entry.key(), "subscriber queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        // Removing while iterating would deadlock on the shard lock.
        for id in gone {
            self.subscribers.remove(&id);
            tracing::debug!(subscription = id, "pruned closed subscriber");
        }
    }
}
