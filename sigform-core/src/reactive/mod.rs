//! Reactive Primitives
//!
//! The cells every form value lives in.
//!
//! - [`Signal`] holds a value. Reads inside a memo or effect subscribe the
//!   reader; every `set` notifies listeners and dependents once.
//! - [`Memo`] caches a derived value and recomputes lazily after one of its
//!   sources changed.
//! - [`Effect`] re-runs a side effect whenever a source it read changes.
//!   A mounted field watches its own cell with one.
//!
//! Dependencies are discovered while a computation runs, through the
//! thread-local tracking stack in [`ReactiveContext`]. [`Runtime::batch`]
//! holds effect runs back until the outermost batch closes, so a structural
//! edit touching many cells wakes each dependent once.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use context::{ReactiveContext, SubscriberId};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
