//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, all subscribers are notified.
//!
//! 3. Notifications trigger re-execution of dependent computations.
//!
//! Replacing the value is the unit of change: every `set` notifies exactly
//! once, whatever the size of the value.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::{ReactiveContext, SubscriberId};
use super::runtime::Runtime;

/// A callback attached directly to one signal.
#[derive(Clone)]
struct Listener {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
}

struct SignalInner<T> {
    /// Unique source identifier.
    id: u64,

    /// The current value.
    value: RwLock<T>,

    /// Listeners attached directly to this signal.
    notifiers: RwLock<Vec<Listener>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::remove_source(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same value and subscribers.
///
/// # Example
///
/// ```rust
/// use sigform_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: Runtime::next_source_id(),
                value: RwLock::new(value),
                notifiers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether two handles point at the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::track(self.inner.id) {
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.notify_subscribers();
        Runtime::notify_signal_change(self.inner.id);
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = self.with_untracked(f);
        self.set(new_value);
    }

    /// Register a notification callback for a subscriber.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .notifiers
            .write()
            .push(Listener {
                id: subscriber_id,
                notify: Arc::new(notify),
            });
    }

    /// Register a notification callback under a fresh ID.
    pub fn watch<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.subscribe(id, notify);
        id
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .notifiers
            .write()
            .retain(|listener| listener.id != subscriber_id);
    }

    fn notify_subscribers(&self) {
        // Snapshot the list so callbacks may (un)subscribe.
        let notifiers: Vec<Listener> = self.inner.notifiers.read().clone();
        for listener in notifiers {
            (listener.notify)();
        }
    }

    /// Number of listeners plus computations depending on this signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifiers.read().len() + Runtime::subscriber_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
