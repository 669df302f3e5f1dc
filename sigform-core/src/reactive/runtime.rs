//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It manages the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. When a memo or effect is created, it registers with the runtime.
//!
//! 2. When a memo or effect reads a source (signal or memo), the runtime
//!    records the dependency.
//!
//! 3. When a source changes, the runtime:
//!    a. Finds all dependent memos/effects
//!    b. Marks them as "maybe dirty"
//!    c. Runs effects, or queues them while a batch is open
//!    d. Memos are lazy - they recompute on next access
//!
//! # Batching
//!
//! [`Runtime::batch`] defers effects until the outermost batch closes. Each
//! queued effect then runs once, however many of its sources changed, so
//! observers never see a half-applied update.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::context::SubscriberId;

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);

    /// Schedule this reactive value for execution (effects only).
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The reactive runtime.
pub struct Runtime;

type Registry = RwLock<HashMap<SubscriberId, Weak<dyn Reactive>>>;
type SourceSubscribers = RwLock<HashMap<u64, IndexSet<SubscriberId>>>;

// Maps subscriber IDs to weak references to avoid preventing cleanup.
static REGISTRY: OnceLock<Registry> = OnceLock::new();
static SOURCE_SUBSCRIBERS: OnceLock<SourceSubscribers> = OnceLock::new();
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn get_source_subscribers() -> &'static SourceSubscribers {
    SOURCE_SUBSCRIBERS.get_or_init(|| RwLock::new(HashMap::new()))
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queued: HashSet<SubscriberId>,
    pending: Vec<Arc<dyn Reactive>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Closes one batch level on drop, also when the batch body panics.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        BATCH.with(|batch| batch.borrow_mut().depth -= 1);
    }
}

impl Runtime {
    /// Allocate an ID for a new source (signal or memo).
    pub fn next_source_id() -> u64 {
        SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();

        get_registry().write().insert(id, Arc::downgrade(&reactive));

        ReactiveHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        get_registry().write().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source_id: u64, subscriber_id: SubscriberId) {
        get_source_subscribers()
            .write()
            .entry(source_id)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let mut subscribers = get_source_subscribers().write();
        for subs in subscribers.values_mut() {
            subs.shift_remove(&subscriber_id);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
    }

    /// Forget a source that no longer exists.
    pub fn remove_source(source_id: u64) {
        get_source_subscribers().write().remove(&source_id);
    }

    /// Number of computations currently depending on a source.
    pub fn subscriber_count(source_id: u64) -> usize {
        get_source_subscribers()
            .read()
            .get(&source_id)
            .map_or(0, IndexSet::len)
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(source_id: u64) {
        let subscriber_ids: Vec<SubscriberId> = {
            let subscribers = get_source_subscribers().read();
            match subscribers.get(&source_id) {
                Some(ids) => ids.iter().copied().collect(),
                None => return,
            }
        };

        let reactives: Vec<Arc<dyn Reactive>> = {
            let registry = get_registry().read();
            subscriber_ids
                .iter()
                .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                .collect()
        };

        // Locks are released before any reactive code runs.
        let mut effects_to_run = Vec::new();
        for reactive in reactives {
            reactive.mark_maybe_dirty();
            if reactive.is_eager() {
                effects_to_run.push(reactive);
            }
        }

        for effect in effects_to_run {
            if !Self::defer(&effect) {
                tracing::trace!(source_id, subscriber = ?effect.subscriber_id(), "running effect");
                effect.schedule();
            }
        }
    }

    /// Queue an effect in the open batch. Returns `false` outside a batch.
    fn defer(effect: &Arc<dyn Reactive>) -> bool {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return false;
            }
            if batch.queued.insert(effect.subscriber_id()) {
                batch.pending.push(Arc::clone(effect));
            }
            true
        })
    }

    /// Run `f` with effects deferred until the outermost batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        let result = {
            let _guard = BatchGuard;
            f()
        };
        if !Self::is_batching() {
            Self::flush();
        }
        result
    }

    fn flush() {
        loop {
            let pending = BATCH.with(|batch| {
                let mut batch = batch.borrow_mut();
                batch.queued.clear();
                std::mem::take(&mut batch.pending)
            });
            if pending.is_empty() {
                break;
            }
            tracing::trace!(count = pending.len(), "flushing batched effects");
            for effect in pending {
                effect.schedule();
            }
        }
    }

    /// Whether a batch is open on this thread.
    pub fn is_batching() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }

    /// Run `f` without registering any dependencies.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        ReactiveContext::untracked(f)
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
