//! Upward change propagation.
//!
//! An edit starts as a diff of a field's value against its snapshot. Each
//! step prefixes the patches with the field's own segment and folds them
//! into the parent's cell, until a top-level field folds into the root.
//!
//! - A step whose field is no longer registered is discarded.
//! - A step whose parent is not registered yet is queued under the parent's
//!   name and delivered exactly once, when the parent registers. Queued
//!   patches keep their cause, and are dropped when the field that queued
//!   them unregisters first.
//! - Steps run one at a time. Work produced while a step runs (observers
//!   writing other fields, say) is queued behind it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::patch::{self, Patch};
use crate::path;
use crate::reactive::Runtime;
use crate::registry::FieldRecord;
use crate::tree::FieldTree;
use crate::value::Value;

use super::field::{FieldId, FieldPhase, FieldState};
use super::FormInner;

/// Why a change travels to the root. Only edits reach change observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cause {
    Edit,
    Mount,
}

#[derive(Debug)]
pub(crate) enum Step {
    /// `patches` are relative to the field `name`; fold them into its parent.
    Emit {
        name: String,
        patches: Vec<Patch>,
        cause: Cause,
        origin: Option<FieldId>,
    },
    /// `patches` are relative to the registered field `target`; fold them
    /// into it and continue from there.
    Deliver {
        target: String,
        patches: Vec<Patch>,
        cause: Cause,
    },
}

/// Patches a registered field could not hand to its missing parent.
#[derive(Debug)]
pub(crate) struct Queued {
    /// Name of the field whose step stopped at the missing parent.
    pub(crate) from: String,
    pub(crate) patches: Vec<Patch>,
    pub(crate) cause: Cause,
}

/// Patches waiting for the named parent to register.
#[derive(Debug, Default)]
pub(crate) struct PendingPatches {
    by_parent: IndexMap<String, Vec<Queued>>,
}

impl PendingPatches {
    pub(crate) fn push(&mut self, parent: String, queued: Queued) {
        self.by_parent.entry(parent).or_default().push(queued);
    }

    /// Take everything queued for `parent` as one delivery.
    ///
    /// The delivery counts as an edit when any queued batch was one.
    pub(crate) fn take(&mut self, parent: &str) -> Option<(Vec<Patch>, Cause)> {
        let queued = self.by_parent.shift_remove(parent)?;
        let cause = if queued.iter().any(|q| q.cause == Cause::Edit) {
            Cause::Edit
        } else {
            Cause::Mount
        };
        let patches = queued.into_iter().flat_map(|q| q.patches).collect();
        Some((patches, cause))
    }

    /// Drop every batch queued by the field `from`. Returns how many.
    pub(crate) fn forget(&mut self, from: &str) -> usize {
        let mut dropped = 0;
        self.by_parent.retain(|_, queued| {
            let before = queued.len();
            queued.retain(|q| q.from != from);
            dropped += before - queued.len();
            !queued.is_empty()
        });
        dropped
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }
}

/// Segments a field tree addresses inside the form document.
///
/// A single tree segment may itself be dotted (`nested.text`).
pub(crate) fn value_segments(tree: &FieldTree) -> Vec<String> {
    tree.segments()
        .iter()
        .flat_map(|segment| path::parse_path(segment))
        .collect()
}

impl FormInner {
    /// Queue `step` and run the queue unless it is already running.
    pub(crate) fn propagate(&self, step: Step) {
        self.steps.lock().push_back(step);
        self.drain_steps();
    }

    pub(crate) fn drain_steps(&self) {
        if self.propagating.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut changed = false;
        loop {
            let step = self.steps.lock().pop_front();
            let Some(step) = step else {
                break;
            };
            changed |= self.run_step(step);
        }
        self.propagating.store(false, Ordering::SeqCst);

        if changed {
            self.notify_change();
        }
    }

    /// Returns `true` when an edit reached the root.
    fn run_step(&self, step: Step) -> bool {
        match step {
            Step::Emit {
                name,
                patches,
                cause,
                origin,
            } => {
                let origin = origin.and_then(|id| self.field(id));
                if let Some(field) = &origin {
                    field.set_phase(FieldPhase::Propagating);
                }
                let reached = self.run_chain(name, patches, cause);
                if let Some(field) = &origin {
                    let mut phase = field.phase.lock();
                    if *phase == FieldPhase::Propagating {
                        *phase = FieldPhase::Registered;
                    }
                }
                reached
            }
            Step::Deliver {
                target,
                patches,
                cause,
            } => {
                let record = self.registry.lock().get(&target).cloned();
                let Some(record) = record else {
                    tracing::debug!(name = %target, "delivery target unregistered, discarding");
                    return false;
                };
                self.fold_into(&record, &patches);
                self.run_chain(target, patches, cause)
            }
        }
    }

    fn run_chain(&self, mut name: String, mut patches: Vec<Patch>, cause: Cause) -> bool {
        loop {
            let record = self.registry.lock().get(&name).cloned();
            let Some(record) = record else {
                tracing::trace!(%name, "field unregistered, discarding patches");
                return false;
            };

            if let Some(own) = record.field_tree.last() {
                let own = path::parse_path(own);
                for patch in &mut patches {
                    patch.prefix(&own);
                }
            }

            let parent_tree = record.field_tree.parent();
            if parent_tree.is_empty() {
                self.fold_into_root(&patches);
                return cause == Cause::Edit;
            }

            let parent_name = parent_tree.name();
            let parent = self.registry.lock().get(&parent_name).cloned();
            match parent {
                Some(parent) => {
                    self.fold_into(&parent, &patches);
                    name = parent_name;
                }
                None => {
                    tracing::debug!(parent = %parent_name, count = patches.len(), ?cause, "parent not registered, queueing patches");
                    let queued = Queued {
                        from: name,
                        patches,
                        cause,
                    };
                    self.pending.lock().push(parent_name, queued);
                    return false;
                }
            }
        }
    }

    /// Write `patches` into a parent field's cell.
    ///
    /// The snapshot is brought up to date inside the same batch, so the
    /// parent's own watcher sees no difference and does not propagate the
    /// engine's write a second time.
    fn fold_into(&self, record: &FieldRecord, patches: &[Patch]) {
        tracing::trace!(name = %record.name, count = patches.len(), "folding into parent");
        Runtime::batch(|| {
            if let Err(err) = record.cell.apply_patches(patches) {
                tracing::warn!(name = %record.name, %err, "patches could not be applied");
            }
            *record.snapshot.lock() = record.cell.dump_untracked();
        });
    }

    fn fold_into_root(&self, patches: &[Patch]) {
        tracing::trace!(count = patches.len(), "folding into root");
        if let Err(err) = self.root.apply_patches(patches) {
            tracing::warn!(%err, "patches could not be applied to the form root");
        }
    }

    /// Diff a registered field against its snapshot.
    pub(crate) fn edit_step(&self, field: &FieldState, value: Value) -> Option<Step> {
        let patches = {
            let mut snapshot = field.snapshot.lock();
            let patches = patch::diff(&snapshot, &value);
            *snapshot = value;
            patches
        };
        if patches.is_empty() {
            return None;
        }
        let name = field.name()?;
        tracing::trace!(%name, count = patches.len(), "field edited");
        Some(Step::Emit {
            name,
            patches,
            cause: Cause::Edit,
            origin: Some(field.id),
        })
    }

    /// Called by a field's watcher after its cell changed.
    pub(crate) fn field_written(&self, field: &Arc<FieldState>, value: Value) {
        if !field.is_live() {
            return;
        }
        if self.batch_depth.load(Ordering::SeqCst) > 0 {
            self.dirty.lock().insert(field.id);
            return;
        }
        if let Some(step) = self.edit_step(field, value) {
            self.propagate(step);
        }
    }

    /// Propagate every field edited during a form batch, parents first.
    pub(crate) fn flush_dirty(&self) {
        let ids: Vec<FieldId> = self.dirty.lock().drain(..).collect();
        let mut edited: Vec<(String, Arc<FieldState>)> = ids
            .into_iter()
            .filter_map(|id| self.field(id))
            .filter_map(|field| field.name().map(|name| (name, field)))
            .collect();
        edited.sort_by(|a, b| a.0.cmp(&b.0));

        let steps: Vec<Step> = edited
            .iter()
            .filter_map(|(_, field)| self.edit_step(field, field.cell.dump_untracked()))
            .collect();
        self.steps.lock().extend(steps);
        self.drain_steps();
    }

    /// Push the root document down into every registered field.
    ///
    /// Snapshots are updated first, so nothing travels back up.
    pub(crate) fn sync_fields_down(&self) {
        let records: Vec<FieldRecord> = self.registry.lock().iter().cloned().collect();
        let doc = self.root.dump_untracked();
        for record in records {
            let next = path::get_segments(&doc, &value_segments(&record.field_tree))
                .cloned()
                .unwrap_or_default();
            let current = record.cell.dump_untracked();
            if current == next {
                *record.snapshot.lock() = next;
                continue;
            }
            tracing::trace!(name = %record.name, "syncing field from root");
            Runtime::batch(|| {
                *record.snapshot.lock() = next.clone();
                if record.cell.apply_patches(&patch::diff(&current, &next)).is_err() {
                    record.cell.set_value(next);
                }
            });
        }
    }

    pub(crate) fn notify_change(&self) {
        let value = self.root.dump_untracked();
        let observers = self.observers.lock().on_change.clone();
        for observer in observers {
            observer(&value);
        }
    }
}
