//! Dependency tracking.
//!
//! Each thread keeps a stack of tracking frames. Memos and effects run
//! their bodies inside a frame, and every source read while that frame is on
//! top is recorded in it. An untracked frame records nothing and hides the
//! frames below it, so reads made on behalf of the engine never become
//! dependencies of whatever computation happens to be running.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Identity of a computation or listener observing reactive sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

enum Frame {
    Tracked {
        subscriber: SubscriberId,
        /// Sources in first-read order.
        sources: IndexSet<u64>,
    },
    Untracked,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame on drop, so a panicking body leaves the stack balanced.
struct FrameGuard {
    popped: bool,
}

impl FrameGuard {
    fn push(frame: Frame) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(frame));
        Self { popped: false }
    }

    fn finish(mut self) -> IndexSet<u64> {
        self.popped = true;
        match FRAMES.with(|frames| frames.borrow_mut().pop()) {
            Some(Frame::Tracked { sources, .. }) => sources,
            _ => IndexSet::new(),
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if !self.popped {
            FRAMES.with(|frames| frames.borrow_mut().pop());
        }
    }
}

/// Entry points into the tracking stack.
pub struct ReactiveContext;

impl ReactiveContext {
    /// Run `f` on behalf of `subscriber`.
    ///
    /// Returns the result together with the sources `f` read.
    pub fn run<R>(subscriber: SubscriberId, f: impl FnOnce() -> R) -> (R, IndexSet<u64>) {
        let guard = FrameGuard::push(Frame::Tracked {
            subscriber,
            sources: IndexSet::new(),
        });
        let result = f();
        (result, guard.finish())
    }

    /// Run `f` with tracking switched off.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _guard = FrameGuard::push(Frame::Untracked);
        f()
    }

    /// The computation reads are currently attributed to.
    pub fn current_subscriber() -> Option<SubscriberId> {
        FRAMES.with(|frames| match frames.borrow().last() {
            Some(Frame::Tracked { subscriber, .. }) => Some(*subscriber),
            _ => None,
        })
    }

    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Record a read of `source_id` in the top frame.
    ///
    /// Returns the reading subscriber, if the read was tracked.
    pub fn track(source_id: u64) -> Option<SubscriberId> {
        FRAMES.with(|frames| match frames.borrow_mut().last_mut() {
            Some(Frame::Tracked { subscriber, sources }) => {
                sources.insert(source_id);
                Some(*subscriber)
            }
            _ => None,
        })
    }
}
