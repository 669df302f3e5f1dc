//! Mounted fields.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::deep::DeepSignal;
use crate::error::Result;
use crate::patch;
use crate::reactive::Effect;
use crate::tree::FieldTree;
use crate::value::Value;

use super::errors::FieldError;
use super::SigForm;

/// Identity of a mounted field, stable across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u64);

impl FieldId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle of a field.
///
/// A mounted field is provisional until its name has been discovered.
/// Registered fields move to `Propagating` while one of their edits travels
/// towards the root, and back afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPhase {
    Provisional,
    Registered,
    Propagating,
    Unregistered,
}

pub(crate) type Resolver = Box<dyn Fn(&str) -> Result<FieldTree> + Send + Sync>;

pub(crate) struct FieldState {
    pub(crate) id: FieldId,
    pub(crate) cell: DeepSignal,
    pub(crate) snapshot: Arc<Mutex<Value>>,
    pub(crate) default: Option<Value>,
    pub(crate) resolver: Resolver,
    pub(crate) tree: Mutex<Option<FieldTree>>,
    pub(crate) phase: Mutex<FieldPhase>,
    pub(crate) watcher: Mutex<Option<Effect>>,
}

impl FieldState {
    pub(crate) fn new(default: Option<Value>, resolver: Resolver) -> Self {
        let initial = default.clone().unwrap_or_default();
        Self {
            id: FieldId::next(),
            snapshot: Arc::new(Mutex::new(initial.clone())),
            cell: DeepSignal::wrap(initial),
            default,
            resolver,
            tree: Mutex::new(None),
            phase: Mutex::new(FieldPhase::Provisional),
            watcher: Mutex::new(None),
        }
    }

    pub(crate) fn phase(&self) -> FieldPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: FieldPhase) {
        *self.phase.lock() = phase;
    }

    pub(crate) fn tree(&self) -> Option<FieldTree> {
        self.tree.lock().clone()
    }

    pub(crate) fn name(&self) -> Option<String> {
        self.tree.lock().as_ref().map(FieldTree::name)
    }

    pub(crate) fn is_live(&self) -> bool {
        matches!(self.phase(), FieldPhase::Registered | FieldPhase::Propagating)
    }
}

/// Handle to a field mounted on a [`SigForm`].
///
/// The field owns its cell: writing through [`set`](Field::set) or any
/// structural helper on [`cell`](Field::cell) is the only way a field
/// changes the form document. The engine folds the change into every
/// ancestor.
#[derive(Clone)]
pub struct Field {
    pub(crate) form: SigForm,
    pub(crate) state: Arc<FieldState>,
}

impl Field {
    pub fn id(&self) -> FieldId {
        self.state.id
    }

    /// The field's own reactive cell.
    pub fn cell(&self) -> DeepSignal {
        self.state.cell.clone()
    }

    /// Current plain value.
    pub fn value(&self) -> Value {
        self.state.cell.dump_untracked()
    }

    /// Replace the field's value.
    pub fn set(&self, value: impl Into<Value>) {
        self.state.cell.set_value(value);
    }

    /// Edit a copy of the value and write back only what changed.
    pub fn update(&self, recipe: impl FnOnce(&mut Value)) -> Result<()> {
        let (_, patches) = patch::mutate(&self.value(), recipe, None);
        self.state.cell.apply_patches(&patches)
    }

    /// Full dotted name, once discovered.
    pub fn full_name(&self) -> Option<String> {
        self.state.name()
    }

    pub fn field_tree(&self) -> Option<FieldTree> {
        self.state.tree()
    }

    pub fn phase(&self) -> FieldPhase {
        self.state.phase()
    }

    /// Value the field was mounted with.
    pub fn default_value(&self) -> Option<&Value> {
        self.state.default.as_ref()
    }

    /// Set this field's error. Ignored until the name is known.
    pub fn set_error(&self, error: impl Into<FieldError>) {
        match self.full_name() {
            Some(name) => self.form.set_field_error(&name, error),
            None => tracing::debug!(field = ?self.id(), "error set on provisional field ignored"),
        }
    }

    pub fn clear_error(&self) {
        if let Some(name) = self.full_name() {
            self.form.clear_field_error(&name);
        }
    }

    /// Committed error of this field.
    pub fn error(&self) -> Option<FieldError> {
        self.full_name().and_then(|name| self.form.error(&name))
    }

    /// Write `value` at this field's path in the form document and sync it
    /// back into the field, without notifying change observers.
    ///
    /// Returns `false` while the field is provisional.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<bool> {
        match self.full_name() {
            Some(name) => {
                self.form.set_field_value(&name, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restore the value the field was mounted with.
    pub fn clear_value(&self) {
        self.set(self.state.default.clone().unwrap_or_default());
    }

    /// Unregister and stop observing the cell.
    pub fn unmount(&self) {
        self.form.inner.unmount_field(&self.state);
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.state.id)
            .field("name", &self.full_name())
            .field("phase", &self.phase())
            .field("value", &self.value())
            .finish()
    }
}
