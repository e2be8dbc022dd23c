//! Subscription handles and the callback registry shared by the bus, the
//! data store and the state manager.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::error;

/// Locks a mutex, recovering the data if a previous holder panicked.
/// Callbacks never run under a lock, so a poisoned guard only means an
/// unrelated panic elsewhere.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one subscriber callback, containing any panic so delivery to the
/// remaining subscribers continues.
pub(crate) fn isolate(label: &str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("subscriber for {} failed: {}", label, message);
            false
        }
    }
}

/// Identifier of a registered callback.
pub type SubscriptionId = u64;

type Release = Box<dyn FnOnce() + Send>;

/// Handle to a registered callback.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
/// Unsubscribing is immediate and idempotent.
pub struct Subscription {
    id: SubscriptionId,
    release: Mutex<Option<Release>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the callback. Returns `true` only for the call that actually
    /// released it.
    pub fn unsubscribe(&self) -> bool {
        let release = lock(&self.release).take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.release).is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Entry<K, C: ?Sized> {
    id: SubscriptionId,
    key: K,
    callback: Arc<C>,
}

/// Ordered callback registry. Each entry carries a key used to filter
/// deliveries (event kind, model id, state key).
pub(crate) struct Subscribers<K, C: ?Sized> {
    next_id: SubscriptionId,
    entries: Vec<Entry<K, C>>,
}

impl<K, C: ?Sized> Default for Subscribers<K, C> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<K, C: ?Sized> Subscribers<K, C> {
    pub(crate) fn insert(&mut self, key: K, callback: Arc<C>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, key, callback });
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Callbacks whose key satisfies `filter`, in registration order.
    pub(crate) fn snapshot(&self, filter: impl Fn(&K) -> bool) -> Vec<Arc<C>> {
        self.entries
            .iter()
            .filter(|e| filter(&e.key))
            .map(|e| Arc::clone(&e.callback))
            .collect()
    }

    pub(crate) fn count(&self, filter: impl Fn(&K) -> bool) -> usize {
        self.entries.iter().filter(|e| filter(&e.key)).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
