//! Fan-out of tailed lines to registered subscribers.

use crate::error::Result;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// A consumer of tailed lines.
///
/// Any `Fn(&str) -> Result<()>` closure that is `Send + Sync` is a subscriber.
pub trait LineSubscriber: Send + Sync {
    /// Handles one line, without its terminator.
    fn on_line(&self, line: &str) -> Result<()>;
}

impl<F> LineSubscriber for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn on_line(&self, line: &str) -> Result<()> {
        self(line)
    }
}

/// Handle returned by registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    id: SubscriptionId,
    subscriber: Arc<dyn LineSubscriber>,
}

/// Thread-safe set of subscribers.
///
/// Registration swaps in a new copy of the subscriber list; `broadcast`
/// delivers to the list current at the time of the call without holding the
/// lock while subscribers run.
pub struct BroadcastRegistry {
    entries: RwLock<Arc<Vec<Entry>>>,
    next_id: AtomicU64,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds `subscriber`, or returns its existing id if this same `Arc` is
    /// already registered.
    pub fn register(&self, subscriber: Arc<dyn LineSubscriber>) -> SubscriptionId {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries
            .iter()
            .find(|entry| same_subscriber(&entry.subscriber, &subscriber))
        {
            return entry.id;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut updated = Vec::with_capacity(entries.len() + 1);
        updated.extend(entries.iter().cloned());
        updated.push(Entry { id, subscriber });
        *entries = Arc::new(updated);

        debug!(subscription = %id, subscribers = entries.len(), "Subscriber registered");
        id
    }

    /// Registers a closure as a subscriber.
    pub fn register_fn<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Arc::new(handler))
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.remove_where(|entry| entry.id == id)
    }

    /// Removes `subscriber` by identity. Returns `false` if it was not registered.
    pub fn unregister_subscriber(&self, subscriber: &Arc<dyn LineSubscriber>) -> bool {
        self.remove_where(|entry| same_subscriber(&entry.subscriber, subscriber))
    }

    /// Delivers `line` to every current subscriber and returns how many
    /// accepted it.
    ///
    /// A subscriber that returns an error or panics is logged and skipped;
    /// it stays registered and the remaining subscribers still get the line.
    pub fn broadcast(&self, line: &str) -> usize {
        let snapshot = self.snapshot();
        let mut delivered = 0;

        for entry in snapshot.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| entry.subscriber.on_line(line))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(subscription = %entry.id, error = %e, "Failed to deliver line");
                }
                Err(_) => {
                    warn!(subscription = %entry.id, "Subscriber panicked while handling line");
                }
            }
        }

        delivered
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.snapshot().iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Entry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&entries)
    }

    fn remove_where(&self, matches: impl Fn(&Entry) -> bool) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if !entries.iter().any(&matches) {
            return false;
        }

        let updated: Vec<Entry> = entries.iter().filter(|e| !matches(*e)).cloned().collect();
        *entries = Arc::new(updated);
        debug!(subscribers = entries.len(), "Subscriber unregistered");
        true
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BroadcastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

fn same_subscriber(a: &Arc<dyn LineSubscriber>, b: &Arc<dyn LineSubscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
