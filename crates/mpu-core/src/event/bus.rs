//! Subscriber registry and fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::{EventKind, UploadEvent};

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Kind(EventKind),
    Any,
}

impl EventFilter {
    fn matches(self, kind: EventKind) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Kind(k) => k == kind,
        }
    }
}

/// Handle returned by `subscribe`; pass it to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventHandler = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    handler: EventHandler,
}

/// Shared subscriber list. Handlers run on the delivering session's event
/// thread, never under the bus lock.
#[derive(Default)]
pub struct EventBus {
    subs: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                id,
                filter,
                handler: Arc::new(handler),
            });
        id
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Remove every subscription registered with exactly `filter`. Returns how many were removed.
    pub fn unsubscribe_filter(&self, filter: EventFilter) -> usize {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.filter != filter);
        before - subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver `event` to every matching subscriber, isolating panics.
    pub fn dispatch(&self, event: &UploadEvent) {
        let handlers: Vec<(SubscriptionId, EventHandler)> = self
            .subs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.filter.matches(event.kind))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();
        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(
                    upload_id = %event.upload_id,
                    event = %event.kind,
                    subscription = id.0,
                    "event handler panicked; continuing"
                );
            }
        }
    }
}
