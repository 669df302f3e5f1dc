//! The form container.
//!
//! A [`SigForm`] owns the root document, the registry of named fields, the
//! error map, and the change and submit observers. Fields are mounted on
//! nodes of the host's rendering tree and stay provisional until the next
//! [`tick`](SigForm::tick) discovers their names. From then on every write
//! to a field's cell is folded into its ancestors and the root.
//!
//! ```rust
//! use sigform_core::form::SigForm;
//! use sigform_core::tree::NodeTree;
//! use sigform_core::Value;
//!
//! let form = SigForm::default();
//! let tree = NodeTree::new();
//! let root = tree.root(form.marker());
//! let node = tree.append(root, Some("text"));
//!
//! let field = form.mount_field(tree.anchor(node), Some(Value::from("hello")));
//! form.settle().unwrap();
//!
//! field.set("world");
//! assert_eq!(form.value().child("text"), Some(&Value::from("world")));
//! ```

mod errors;
mod field;
mod frame;
mod propagation;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use crate::config::FormConfig;
use crate::deep::DeepSignal;
use crate::error::Result;
use crate::patch::Patch;
use crate::path;
use crate::reactive::{Effect, Memo, Runtime};
use crate::registry::{FieldRecord, FieldRegistry};
use crate::tree::{compute_field_tree, FieldNode, FieldTree};
use crate::value::Value;

pub use errors::{ErrorMap, FieldError};
pub use field::{Field, FieldId, FieldPhase};

use errors::ErrorState;
use field::{FieldState, Resolver};
use frame::{FrameQueue, FrameTask};
use propagation::{value_segments, Cause, PendingPatches, Step};

type Observer = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Observers {
    on_change: Vec<Observer>,
    on_submit: Vec<Observer>,
}

pub(crate) struct FormInner {
    marker: String,
    max_settle_frames: usize,
    root: DeepSignal,
    registry: Mutex<FieldRegistry>,
    fields: Mutex<IndexMap<FieldId, Arc<FieldState>>>,
    pending: Mutex<PendingPatches>,
    steps: Mutex<VecDeque<Step>>,
    propagating: AtomicBool,
    batch_depth: AtomicUsize,
    dirty: Mutex<IndexSet<FieldId>>,
    frames: Mutex<FrameQueue>,
    errors: ErrorState,
    observers: Mutex<Observers>,
}

impl FormInner {
    fn field(&self, id: FieldId) -> Option<Arc<FieldState>> {
        self.fields.lock().get(&id).cloned()
    }

    fn schedule(&self, task: FrameTask) {
        if self.frames.lock().schedule(task) {
            tracing::trace!(?task, "scheduled for next frame");
        }
    }

    /// Resolve every mounted field. A failing field does not stop the
    /// others; the first failure is returned afterwards.
    fn resolve_all(&self) -> Result<()> {
        let ids: Vec<FieldId> = self.fields.lock().keys().copied().collect();
        let mut failure = None;
        for id in ids {
            if let Err(err) = self.resolve_field(id) {
                tracing::warn!(field = ?id, %err, "field could not be resolved");
                failure.get_or_insert(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Discover the field's name and (re-)register it when it changed.
    fn resolve_field(&self, id: FieldId) -> Result<()> {
        let Some(field) = self.field(id) else {
            return Ok(());
        };
        if field.phase() == FieldPhase::Unregistered {
            return Ok(());
        }
        let tree = (field.resolver)(&self.marker)?;
        match field.tree() {
            Some(current) if current == tree => {}
            Some(current) => {
                tracing::debug!(from = %current, to = %tree, "field renamed");
                self.unregister_record(&field, &current);
                self.register_field(&field, tree, false);
            }
            None => self.register_field(&field, tree, true),
        }
        Ok(())
    }

    fn register_field(&self, field: &Arc<FieldState>, tree: FieldTree, first: bool) {
        let name = tree.name();

        let mut adopted = false;
        if first && field.default.is_none() {
            if let Some(found) = self.document_value(&tree) {
                *field.snapshot.lock() = found.clone();
                field.cell.set_value(found);
                adopted = true;
            }
        }

        let value = field.cell.dump_untracked();
        *field.snapshot.lock() = value.clone();
        let record = FieldRecord {
            name: name.clone(),
            field_tree: tree.clone(),
            cell: field.cell.clone(),
            snapshot: field.snapshot.clone(),
        };
        let replaced = self.registry.lock().register(record);
        if replaced.is_some_and(|r| !r.cell.ptr_eq(&field.cell)) {
            tracing::debug!(%name, "record of another field replaced");
        }
        *field.tree.lock() = Some(tree);
        field.set_phase(FieldPhase::Registered);
        self.schedule(FrameTask::ResolveAll);

        let silent = adopted || (field.default.is_none() && value.is_null());
        if !silent {
            self.propagate(Step::Emit {
                name: name.clone(),
                patches: vec![Patch::replace(Vec::new(), value)],
                cause: Cause::Mount,
                origin: None,
            });
        }

        let queued = self.pending.lock().take(&name);
        if let Some((patches, cause)) = queued {
            tracing::debug!(%name, count = patches.len(), ?cause, "delivering queued patches");
            self.propagate(Step::Deliver {
                target: name,
                patches,
                cause,
            });
        }
    }

    fn unregister_record(&self, field: &FieldState, tree: &FieldTree) {
        let name = tree.name();
        let mut registry = self.registry.lock();
        let owned = registry.get(&name).is_some_and(|r| r.cell.ptr_eq(&field.cell));
        if owned {
            registry.unregister(&name);
            drop(registry);
            let dropped = self.pending.lock().forget(&name);
            tracing::debug!(%name, dropped, "unregister field");
        }
    }

    fn unmount_field(&self, field: &Arc<FieldState>) {
        field.set_phase(FieldPhase::Unregistered);
        let watcher = field.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.dispose();
        }
        let tree = field.tree.lock().take();
        if let Some(tree) = tree {
            self.unregister_record(field, &tree);
            self.schedule(FrameTask::ResolveAll);
        }
        self.fields.lock().shift_remove(&field.id);
        self.dirty.lock().shift_remove(&field.id);
    }

    /// Value at `tree` in the root document.
    fn document_value(&self, tree: &FieldTree) -> Option<Value> {
        let doc = self.root.dump_untracked();
        path::get_segments(&doc, &value_segments(tree)).cloned()
    }

    fn update_errors(&self, f: impl FnOnce(&mut ErrorMap)) {
        if self.errors.update(f) {
            self.schedule(FrameTask::FlushErrors);
        }
    }
}

/// Shared handle to one form. Clones refer to the same form.
#[derive(Clone)]
pub struct SigForm {
    inner: Arc<FormInner>,
}

impl SigForm {
    pub fn new(config: FormConfig) -> Self {
        let marker = config.resolve_marker();
        tracing::debug!(%marker, "form created");
        Self {
            inner: Arc::new(FormInner {
                marker,
                max_settle_frames: config.max_settle_frames,
                root: DeepSignal::wrap(config.initial_value),
                registry: Mutex::new(FieldRegistry::new()),
                fields: Mutex::new(IndexMap::new()),
                pending: Mutex::new(PendingPatches::default()),
                steps: Mutex::new(VecDeque::new()),
                propagating: AtomicBool::new(false),
                batch_depth: AtomicUsize::new(0),
                dirty: Mutex::new(IndexSet::new()),
                frames: Mutex::new(FrameQueue::default()),
                errors: ErrorState::new(config.debounce_errors),
                observers: Mutex::new(Observers::default()),
            }),
        }
    }

    /// Segment the form's root node must carry.
    pub fn marker(&self) -> &str {
        &self.inner.marker
    }

    /// The root cell.
    pub fn root(&self) -> DeepSignal {
        self.inner.root.clone()
    }

    /// Plain snapshot of the form document.
    pub fn value(&self) -> Value {
        self.inner.root.dump_untracked()
    }

    // ── Fields ──────────────────────────────────────────────────────────

    /// Mount a field on `node`.
    ///
    /// The field is provisional until the next [`tick`](Self::tick)
    /// discovers its name. Without a `default` it adopts whatever the form
    /// document holds at that name.
    pub fn mount_field<N>(&self, node: N, default: Option<Value>) -> Field
    where
        N: FieldNode + Send + Sync + 'static,
    {
        let resolver: Resolver = Box::new(move |marker: &str| compute_field_tree(&node, marker));
        let state = Arc::new(FieldState::new(default, resolver));
        let watcher = self.watch_cell(&state);
        *state.watcher.lock() = Some(watcher);

        self.inner.fields.lock().insert(state.id, state.clone());
        self.inner.schedule(FrameTask::ResolveField(state.id));
        tracing::debug!(field = ?state.id, "field mounted");

        Field {
            form: self.clone(),
            state,
        }
    }

    /// Effect reporting every write of the field's cell to the form.
    fn watch_cell(&self, state: &Arc<FieldState>) -> Effect {
        let form = Arc::downgrade(&self.inner);
        let field = Arc::downgrade(state);
        let cell = state.cell.clone();
        Effect::new(move || {
            let value = cell.dump();
            Runtime::untracked(|| {
                if let (Some(form), Some(field)) = (form.upgrade(), field.upgrade()) {
                    form.field_written(&field, value);
                }
            });
        })
    }

    /// Handle for the registered field named `name`.
    pub fn field(&self, name: &str) -> Option<Field> {
        let fields: Vec<Arc<FieldState>> = self.inner.fields.lock().values().cloned().collect();
        fields
            .into_iter()
            .find(|state| state.is_live() && state.name().as_deref() == Some(name))
            .map(|state| Field {
                form: self.clone(),
                state,
            })
    }

    /// Names of registered fields, short to long.
    pub fn field_names(&self) -> Vec<String> {
        self.inner.registry.lock().names()
    }

    /// Current value of the field named `name`, falling back to the form
    /// document.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        let registered = self.inner.registry.lock().get_value(name);
        registered.or_else(|| self.inner.root.read(name))
    }

    /// Document assembled from the registered fields themselves.
    pub fn form_data(&self, prefix: Option<&str>) -> Value {
        self.inner.registry.lock().form_data(prefix)
    }

    // ── Frames ──────────────────────────────────────────────────────────

    /// Run one frame: name discovery and error commits queued so far.
    ///
    /// Returns the number of tasks run. A field rendered outside of this
    /// form fails with [`Error::FormRootNotFound`](crate::Error::FormRootNotFound);
    /// the rest of the frame still runs and the first failure is returned.
    pub fn tick(&self) -> Result<usize> {
        let tasks = self.inner.frames.lock().take_frame();
        let mut failure = None;
        for task in &tasks {
            let outcome = match task {
                FrameTask::ResolveField(id) => self.inner.resolve_field(*id),
                FrameTask::ResolveAll => self.inner.resolve_all(),
                FrameTask::FlushErrors => {
                    self.inner.errors.flush();
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                tracing::warn!(?task, %err, "frame task failed");
                failure.get_or_insert(err);
            }
        }
        failure.map_or(Ok(tasks.len()), Err)
    }

    /// Tick until no work is left, up to the configured frame bound.
    ///
    /// Returns the number of frames that did work.
    pub fn settle(&self) -> Result<usize> {
        let mut frames = 0;
        while frames < self.inner.max_settle_frames {
            if self.tick()? == 0 {
                return Ok(frames);
            }
            frames += 1;
        }
        if !self.is_settled() {
            tracing::warn!(frames, "form did not settle");
        }
        Ok(frames)
    }

    /// Whether no frame work and no staged error update is waiting.
    pub fn is_settled(&self) -> bool {
        self.inner.frames.lock().is_empty() && !self.inner.errors.has_staged()
    }

    /// Run `f`, then propagate every field it edited in one go, parents
    /// before children. Change observers fire once.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch_depth.fetch_add(1, Ordering::SeqCst);
        let result = Runtime::batch(f);
        if self.inner.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.flush_dirty();
        }
        result
    }

    // ── Values ──────────────────────────────────────────────────────────

    /// Replace the whole form document and sync every field from it.
    ///
    /// Fields whose path is missing from `value` become `Null`. Change
    /// observers are not notified.
    pub fn reset_form_value(&self, value: impl Into<Value>) {
        let value = value.into();
        Runtime::batch(|| {
            self.inner.root.set_value(value);
            self.inner.sync_fields_down();
        });
    }

    /// Write each dotted path without touching the rest of the document,
    /// then sync the affected fields.
    pub fn set_field_values<I, K, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let patches: Vec<Patch> = values
            .into_iter()
            .map(|(name, value)| Patch::replace(path::parse_path(name.as_ref()).to_vec(), value.into()))
            .collect();
        Runtime::batch(|| {
            self.inner.root.apply_patches(&patches)?;
            self.inner.sync_fields_down();
            Ok(())
        })
    }

    pub fn set_field_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.set_field_values([(name, value.into())])
    }

    /// Restore a field's mount value. Returns `false` for unknown names.
    pub fn clear_field_value(&self, name: &str) -> bool {
        match self.field(name) {
            Some(field) => {
                field.clear_value();
                true
            }
            None => false,
        }
    }

    /// Memo over the form document.
    pub fn watch<T, F>(&self, f: F) -> Memo<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        F: Fn(&Value) -> T + Send + Sync + 'static,
    {
        let root = self.inner.root.clone();
        Memo::new(move || f(&root.dump()))
    }

    /// Memo over the document value at `name`.
    pub fn watch_field(&self, name: &str) -> Memo<Option<Value>> {
        let root = self.inner.root.clone();
        let name = name.to_owned();
        Memo::new(move || root.read(&name))
    }

    // ── Observers ───────────────────────────────────────────────────────

    /// Call `f` with the document after every edit that reached the root.
    pub fn on_change(&self, f: impl Fn(&Value) + Send + Sync + 'static) {
        self.inner.observers.lock().on_change.push(Arc::new(f));
    }

    pub fn on_submit(&self, f: impl Fn(&Value) + Send + Sync + 'static) {
        self.inner.observers.lock().on_submit.push(Arc::new(f));
    }

    /// Hand the document to every submit observer and return it.
    pub fn submit(&self) -> Value {
        let value = self.value();
        let observers = self.inner.observers.lock().on_submit.clone();
        tracing::debug!(observers = observers.len(), "submit");
        for observer in observers {
            observer(&value);
        }
        value
    }

    // ── Errors ──────────────────────────────────────────────────────────

    /// Shallow-merge `errors` into the error map.
    pub fn set_form_errors(&self, errors: ErrorMap) {
        self.inner.update_errors(|map| map.merge(errors));
    }

    pub fn clear_form_errors(&self) {
        self.inner.update_errors(|map| *map = ErrorMap::new());
    }

    pub fn set_field_error(&self, name: &str, error: impl Into<FieldError>) {
        let error = error.into();
        self.inner.update_errors(|map| map.insert(name, error));
    }

    pub fn clear_field_error(&self, name: &str) {
        self.inner.update_errors(|map| {
            map.remove(name);
        });
    }

    /// Committed errors. Tracked inside reactive contexts.
    pub fn errors(&self) -> ErrorMap {
        self.inner.errors.committed()
    }

    pub fn error(&self, name: &str) -> Option<FieldError> {
        self.errors().get(name).cloned()
    }
}

impl Default for SigForm {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

impl fmt::Debug for SigForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigForm")
            .field("marker", &self.inner.marker)
            .field("fields", &self.field_names())
            .field("value", &self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeTree;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn fields_are_provisional_until_tick() {
        let form = SigForm::default();
        let tree = NodeTree::new();
        let root = tree.root(form.marker());
        let node = tree.append(root, Some("text"));

        let field = form.mount_field(tree.anchor(node), Some(Value::from("hello")));
        assert_eq!(field.phase(), FieldPhase::Provisional);
        assert_eq!(field.full_name(), None);
        assert!(form.field_names().is_empty());

        form.settle().unwrap();
        assert_eq!(field.phase(), FieldPhase::Registered);
        assert_eq!(field.full_name().as_deref(), Some("text"));
        assert_eq!(form.value(), v(json!({"text": "hello"})));
    }

    #[test]
    fn mount_does_not_notify_change_observers() {
        let form = SigForm::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        form.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let tree = NodeTree::new();
        let root = tree.root(form.marker());
        let node = tree.append(root, Some("text"));
        let field = form.mount_field(tree.anchor(node), Some(Value::from("hello")));
        form.settle().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        field.set("world");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn field_without_default_adopts_document_value() {
        let form = SigForm::new(FormConfig::default().with_initial_value(v(json!({"name": "Taro"}))));
        let tree = NodeTree::new();
        let root = tree.root(form.marker());
        let node = tree.append(root, Some("name"));

        let field = form.mount_field(tree.anchor(node), None);
        form.settle().unwrap();
        assert_eq!(field.value(), Value::from("Taro"));
    }

    #[test]
    fn unmounted_field_stops_propagating() {
        let form = SigForm::default();
        let tree = NodeTree::new();
        let root = tree.root(form.marker());
        let node = tree.append(root, Some("text"));
        let field = form.mount_field(tree.anchor(node), Some(Value::from("a")));
        form.settle().unwrap();

        field.unmount();
        assert_eq!(field.phase(), FieldPhase::Unregistered);
        field.set("b");
        assert_eq!(form.value(), v(json!({"text": "a"})));
        assert!(form.field("text").is_none());
    }

    #[test]
    fn field_outside_form_fails_tick() {
        let form = SigForm::default();
        let tree = NodeTree::new();
        let stray = tree.root("somewhere-else");
        let node = tree.append(stray, Some("x"));
        form.mount_field(tree.anchor(node), None);
        assert!(matches!(form.tick(), Err(crate::Error::FormRootNotFound { .. })));
    }
}
