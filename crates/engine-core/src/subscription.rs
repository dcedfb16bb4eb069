use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A subscription handle that can be used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    subscriber_id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.subscriber_id
    }
}

/// Synchronous observer registry.
///
/// Callbacks run on the publishing task, in registration order, before
/// `publish` returns. The callback list is copied out of the lock before
/// delivery so a callback may subscribe or unsubscribe without deadlocking.
pub struct SubscriberRegistry<T> {
    subscribers: Arc<RwLock<BTreeMap<u64, Callback<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        SubscriberRegistry {
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> SubscriberRegistry<T> {
    pub fn new() -> Self {
        SubscriberRegistry {
            subscribers: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber_id, Arc::new(callback));

        debug!(subscriber_id, "Subscribed to progress updates");
        Subscription { subscriber_id }
    }

    /// Removes the subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription.subscriber_id)
            .is_some();

        if removed {
            debug!(
                subscriber_id = subscription.subscriber_id,
                "Unsubscribed from progress updates"
            );
        }
        removed
    }

    pub fn publish(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Cleared all progress subscribers");
    }
}
