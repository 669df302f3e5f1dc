//! Deep reactive values.
//!
//! A [`DeepSignal`] wraps a plain [`Value`] so that every nested mapping and
//! sequence is its own [`Signal`]. Reading a container through
//! [`DeepSignal::dump`] inside an effect subscribes to every cell on the way
//! down, so a write to any nested cell re-runs whoever observes an ancestor.
//!
//! # Structural helpers
//!
//! Sequence helpers (`push`, `splice`, `sort`, ...) and mapping helpers
//! (`set`, `assign`, `delete`, `remove`) compute the next backing structure
//! and assign it once. Observers see exactly one notification per logical
//! operation, whatever the number of elements involved. Calling a sequence
//! helper on a mapping (or the other way around) is integration misuse and
//! returns [`Error::NotAContainer`].
//!
//! # Identity
//!
//! Wrapping is idempotent: [`DeepSignal::wrap`] passes an existing
//! `DeepSignal` through untouched, so items that are already wrapped keep
//! their identity when pushed into another sequence.
//!
//! Dates and other scalars are atomic leaves; the wrapper never recurses
//! into them.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::patch::{self, Patch, PatchOp};
use crate::path;
use crate::reactive::{Runtime, Signal, SubscriberId};
use crate::value::{Map, Value};

/// Content of one reactive cell.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Value),
    Array(Vec<DeepSignal>),
    Object(IndexMap<String, DeepSignal>),
}

impl Node {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Node::Array(items.into_iter().map(DeepSignal::from_value).collect()),
            Value::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(key, child)| (key, DeepSignal::from_value(child)))
                    .collect(),
            ),
            leaf => Node::Leaf(leaf),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Node::Leaf(value) => value.kind(),
            Node::Array(_) => "array",
            Node::Object(_) => "object",
        }
    }
}

/// Conversion into a deep signal.
///
/// Plain values are wrapped recursively; deep signals pass through.
pub trait IntoDeepSignal {
    fn into_deep_signal(self) -> DeepSignal;
}

impl IntoDeepSignal for DeepSignal {
    fn into_deep_signal(self) -> DeepSignal {
        self
    }
}

impl IntoDeepSignal for &DeepSignal {
    fn into_deep_signal(self) -> DeepSignal {
        self.clone()
    }
}

impl IntoDeepSignal for Value {
    fn into_deep_signal(self) -> DeepSignal {
        DeepSignal::from_value(self)
    }
}

impl IntoDeepSignal for serde_json::Value {
    fn into_deep_signal(self) -> DeepSignal {
        DeepSignal::from_value(Value::from(self))
    }
}

/// A recursively reactive value. Clones share the same cell.
#[derive(Clone)]
pub struct DeepSignal {
    signal: Signal<Node>,
}

impl DeepSignal {
    /// Wrap `value`. Already wrapped values are returned unchanged.
    pub fn wrap(value: impl IntoDeepSignal) -> Self {
        value.into_deep_signal()
    }

    fn from_value(value: Value) -> Self {
        Self {
            signal: Signal::new(Node::from_value(value)),
        }
    }

    /// ID of this cell's signal.
    pub fn id(&self) -> u64 {
        self.signal.id()
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &DeepSignal) -> bool {
        self.signal.ptr_eq(&other.signal)
    }

    /// Kind of the value held by this cell.
    pub fn kind(&self) -> &'static str {
        self.signal.with_untracked(Node::kind)
    }

    pub fn is_array(&self) -> bool {
        self.signal.with_untracked(|node| matches!(node, Node::Array(_)))
    }

    pub fn is_object(&self) -> bool {
        self.signal.with_untracked(|node| matches!(node, Node::Object(_)))
    }

    /// Number of direct children. Leaves have none.
    pub fn len(&self) -> usize {
        self.signal.with(|node| match node {
            Node::Leaf(_) => 0,
            Node::Array(items) => items.len(),
            Node::Object(map) => map.len(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plain snapshot of the whole subtree.
    ///
    /// Inside a tracking context this subscribes to every nested cell. The
    /// result shares nothing with the cells.
    pub fn dump(&self) -> Value {
        self.signal.with(|node| match node {
            Node::Leaf(value) => value.clone(),
            Node::Array(items) => Value::Array(items.iter().map(DeepSignal::dump).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, child)| (key.clone(), child.dump()))
                    .collect(),
            ),
        })
    }

    /// [`dump`](Self::dump) without subscribing.
    pub fn dump_untracked(&self) -> Value {
        Runtime::untracked(|| self.dump())
    }

    /// Replace the whole value of this cell.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.signal.set(Node::from_value(value.into()));
    }

    /// Direct child cell at `segment`.
    pub fn child(&self, segment: &str) -> Option<DeepSignal> {
        self.signal.with(|node| child_of(node, segment))
    }

    /// Nested cell at the dotted `path`; `None` when any segment is absent.
    pub fn get(&self, path: &str) -> Option<DeepSignal> {
        self.resolve(&path::parse_path(path))
    }

    fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Option<DeepSignal> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.child(first.as_ref())?;
        for segment in rest {
            current = current.child(segment.as_ref())?;
        }
        Some(current)
    }

    /// Plain value at `path`, or `None` when it does not resolve.
    pub fn read(&self, path: &str) -> Option<Value> {
        self.get(path).map(|cell| cell.dump())
    }

    /// Assign `value` to the existing cell at `path`.
    ///
    /// Returns `false` without changing anything when the path does not
    /// resolve. Paths are never created.
    pub fn write(&self, path: &str, value: impl Into<Value>) -> bool {
        match Runtime::untracked(|| self.get(path)) {
            Some(cell) => {
                cell.set_value(value);
                true
            }
            None => false,
        }
    }

    /// Call `notify` after every write to this cell (not its children).
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.signal.watch(notify)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.signal.unsubscribe(id);
    }

    fn node(&self) -> Node {
        self.signal.get_untracked()
    }

    fn update_array<R>(&self, f: impl FnOnce(&mut Vec<DeepSignal>) -> R) -> Result<R> {
        let Node::Array(mut items) = self.node() else {
            return Err(self.not_a("array"));
        };
        let result = f(&mut items);
        self.signal.set(Node::Array(items));
        Ok(result)
    }

    fn with_object<R>(&self, f: impl FnOnce(&IndexMap<String, DeepSignal>) -> R) -> Result<R> {
        self.signal.with_untracked(|node| match node {
            Node::Object(map) => Ok(f(map)),
            other => Err(Error::NotAContainer {
                expected: "object",
                found: other.kind(),
            }),
        })
    }

    fn not_a(&self, expected: &'static str) -> Error {
        Error::NotAContainer {
            expected,
            found: self.kind(),
        }
    }

    // ── Sequence helpers ────────────────────────────────────────────────

    /// Append `items`; returns the new length.
    pub fn push<I, T>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: IntoDeepSignal,
    {
        self.update_array(|current| {
            current.extend(items.into_iter().map(IntoDeepSignal::into_deep_signal));
            current.len()
        })
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.update_array(|current| current.pop().map(|cell| cell.dump_untracked()))
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Result<Option<Value>> {
        self.update_array(|current| {
            (!current.is_empty()).then(|| current.remove(0).dump_untracked())
        })
    }

    /// Prepend `items` in order; returns the new length.
    pub fn unshift<I, T>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: IntoDeepSignal,
    {
        self.update_array(|current| {
            let head: Vec<DeepSignal> = items.into_iter().map(IntoDeepSignal::into_deep_signal).collect();
            current.splice(0..0, head);
            current.len()
        })
    }

    /// Remove `delete_count` items at `start` and insert `items` in their
    /// place, returning the removed values.
    ///
    /// A negative `start` counts from the end. `None` removes everything
    /// from `start` on.
    pub fn splice<I, T>(&self, start: isize, delete_count: Option<usize>, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = T>,
        T: IntoDeepSignal,
    {
        self.update_array(|current| {
            let len = current.len();
            let start = relative_index(start, len);
            let count = delete_count.map_or(len - start, |n| n.min(len - start));
            let inserted: Vec<DeepSignal> = items.into_iter().map(IntoDeepSignal::into_deep_signal).collect();
            current
                .splice(start..start + count, inserted)
                .map(|cell| cell.dump_untracked())
                .collect()
        })
    }

    /// Sort items by [`Value::natural_cmp`].
    ///
    /// Numbers compare numerically, unlike a string-based default sort.
    pub fn sort(&self) -> Result<()> {
        self.sort_by(Value::natural_cmp)
    }

    /// Stable sort of the items by their plain values.
    pub fn sort_by<F>(&self, mut compare: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.update_array(|current| {
            let mut keyed: Vec<(Value, DeepSignal)> = current
                .drain(..)
                .map(|cell| (cell.dump_untracked(), cell))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| compare(a, b));
            current.extend(keyed.into_iter().map(|(_, cell)| cell));
        })
    }

    pub fn reverse(&self) -> Result<()> {
        self.update_array(|current| current.reverse())
    }

    /// Overwrite the slots in `start..end` with fresh copies of `value`.
    pub fn fill(&self, value: impl Into<Value>, start: Option<isize>, end: Option<isize>) -> Result<()> {
        let value = value.into();
        self.update_array(|current| {
            let len = current.len();
            let (from, to) = relative_range(start, end, len);
            for slot in current.iter_mut().take(to).skip(from) {
                *slot = DeepSignal::from_value(value.clone());
            }
        })
    }

    /// Copy the items in `start..end` over the items starting at `target`.
    ///
    /// The length never changes. Copies are fresh cells, so the source and
    /// destination slots stay independent.
    pub fn copy_within(&self, target: isize, start: isize, end: Option<isize>) -> Result<()> {
        self.update_array(|current| {
            let len = current.len();
            let target = relative_index(target, len);
            let (from, to) = relative_range(Some(start), end, len);
            let count = to.saturating_sub(from).min(len - target);
            let copies: Vec<DeepSignal> = current[from..from + count]
                .iter()
                .map(|cell| DeepSignal::from_value(cell.dump_untracked()))
                .collect();
            for (offset, copy) in copies.into_iter().enumerate() {
                current[target + offset] = copy;
            }
        })
    }

    // ── Mapping helpers ─────────────────────────────────────────────────

    /// Set `key` to `value`.
    ///
    /// An existing key is written through its own cell; a new key is
    /// appended with a single write to this cell.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let existing = self.with_object(|map| map.get(key).cloned())?;
        match existing {
            Some(cell) => cell.set_value(value),
            None => {
                let mut map = self.object_entries();
                map.insert(key.to_owned(), DeepSignal::from_value(value.into()));
                self.signal.set(Node::Object(map));
            }
        }
        Ok(())
    }

    /// Set every pair as one batched update.
    pub fn assign<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut map = self.with_object(Clone::clone)?;
        Runtime::batch(|| {
            let mut added = false;
            for (key, value) in pairs {
                let key = key.into();
                match map.get(&key) {
                    Some(cell) => cell.set_value(value),
                    None => {
                        map.insert(key, DeepSignal::from_value(value.into()));
                        added = true;
                    }
                }
            }
            if added {
                self.signal.set(Node::Object(map));
            }
        });
        Ok(())
    }

    /// Remove `keys`; returns how many were present.
    ///
    /// Nothing is written when no key matched.
    pub fn delete<S: AsRef<str>>(&self, keys: &[S]) -> Result<usize> {
        self.remove(|key, _| keys.iter().any(|k| k.as_ref() == key))
    }

    /// Remove every entry for which `predicate(key, value)` holds.
    pub fn remove<F>(&self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&str, &Value) -> bool,
    {
        let mut map = self.with_object(Clone::clone)?;
        let before = map.len();
        map.retain(|key, cell| !predicate(key, &cell.dump_untracked()));
        let removed = before - map.len();
        if removed > 0 {
            self.signal.set(Node::Object(map));
        }
        Ok(removed)
    }

    /// Keys of a mapping cell.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_object(|map| map.keys().cloned().collect())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.with_object(|map| map.contains_key(key)).unwrap_or(false)
    }

    fn object_entries(&self) -> IndexMap<String, DeepSignal> {
        match self.node() {
            Node::Object(map) => map,
            _ => IndexMap::new(),
        }
    }

    // ── Patch folding ───────────────────────────────────────────────────

    /// Fold `patches` into this cell as one batched update.
    ///
    /// Patches targeting an existing nested cell write only that cell, and
    /// only when the value actually differs. A patch through missing
    /// intermediates adds just the missing branch to the deepest existing
    /// mapping, so cells beside it keep their subscribers. When the
    /// deepest existing cell is a scalar or a sequence that cannot take the
    /// patch, that cell alone is rebuilt from its patched snapshot.
    pub fn apply_patches(&self, patches: &[Patch]) -> Result<()> {
        Runtime::batch(|| patches.iter().try_for_each(|patch| self.apply_patch(patch)))
    }

    fn apply_patch(&self, patch: &Patch) -> Result<()> {
        tracing::trace!(op = ?patch.op, path = ?patch.path, "folding patch");
        let Some((key, parents)) = patch.path.split_last() else {
            let next = patch.value.clone().unwrap_or_default();
            if patch.op == PatchOp::Remove || self.dump_untracked() != next {
                self.set_value(next);
            }
            return Ok(());
        };

        let (anchor, depth) = Runtime::untracked(|| self.deepest(parents));
        if depth == parents.len() && anchor.apply_local(patch, key)? {
            return Ok(());
        }
        if depth < parents.len() {
            if patch.op == PatchOp::Remove {
                return Ok(());
            }
            if let Node::Object(_) = anchor.node() {
                let mut branch = Value::Null;
                patch::apply_patch(&mut branch, &patch.relative_to(depth + 1))?;
                return anchor.set(&parents[depth], branch);
            }
        }

        tracing::trace!(depth, "rebuilding ancestor cell");
        let mut doc = anchor.dump_untracked();
        patch::apply_patch(&mut doc, &patch.relative_to(depth))?;
        anchor.set_value(doc);
        Ok(())
    }

    /// Deepest existing cell along `segments`, with how many it consumed.
    fn deepest(&self, segments: &[String]) -> (DeepSignal, usize) {
        let mut current = self.clone();
        for (depth, segment) in segments.iter().enumerate() {
            match current.child(segment) {
                Some(next) => current = next,
                None => return (current, depth),
            }
        }
        (current, segments.len())
    }

    /// Apply `patch` whose last segment is `key` to this parent cell.
    /// Returns `false` when the shape does not allow a local update.
    fn apply_local(&self, patch: &Patch, key: &str) -> Result<bool> {
        let value = patch.value.clone().unwrap_or_default();
        match self.node() {
            Node::Object(map) => {
                match patch.op {
                    PatchOp::Remove => {
                        self.delete(&[key])?;
                    }
                    PatchOp::Replace | PatchOp::Add => match map.get(key) {
                        Some(cell) => set_if_changed(cell, value),
                        None => self.set(key, value)?,
                    },
                }
                Ok(true)
            }
            Node::Array(items) => {
                let Ok(index) = key.parse::<usize>() else {
                    return Ok(false);
                };
                match patch.op {
                    PatchOp::Remove => {
                        if index < items.len() {
                            self.splice(index as isize, Some(1), Vec::<Value>::new())?;
                        }
                        Ok(true)
                    }
                    PatchOp::Replace if index < items.len() => {
                        set_if_changed(&items[index], value);
                        Ok(true)
                    }
                    PatchOp::Replace | PatchOp::Add if index <= items.len() => {
                        self.splice(index as isize, Some(0), [value])?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            Node::Leaf(_) => Ok(false),
        }
    }
}

fn set_if_changed(cell: &DeepSignal, value: Value) {
    if cell.dump_untracked() != value {
        cell.set_value(value);
    }
}

fn child_of(node: &Node, segment: &str) -> Option<DeepSignal> {
    match node {
        Node::Object(map) => map.get(segment).cloned(),
        Node::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        Node::Leaf(_) => None,
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

fn relative_range(start: Option<isize>, end: Option<isize>, len: usize) -> (usize, usize) {
    let from = start.map_or(0, |s| relative_index(s, len));
    let to = end.map_or(len, |e| relative_index(e, len));
    (from, to.max(from))
}

impl From<Value> for DeepSignal {
    fn from(value: Value) -> Self {
        DeepSignal::from_value(value)
    }
}

impl From<Map> for DeepSignal {
    fn from(map: Map) -> Self {
        DeepSignal::from_value(Value::Object(map))
    }
}

impl Serialize for DeepSignal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.dump_untracked().serialize(serializer)
    }
}

impl fmt::Debug for DeepSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSignal")
            .field("id", &self.id())
            .field("value", &self.dump_untracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    /// Records every snapshot an effect observes.
    fn spy(cell: &DeepSignal) -> (Effect, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (c, out) = (cell.clone(), calls.clone());
        let effect = Effect::new(move || out.lock().push(c.dump()));
        (effect, calls)
    }

    #[test]
    fn nested_containers_are_cells() {
        let data = DeepSignal::wrap(v(json!({"a": {"b": [1, 2]}})));
        let a = data.get("a").unwrap();
        let b = data.get("a.b").unwrap();
        assert!(a.is_object());
        assert!(b.is_array());
        assert_ne!(a.id(), b.id());
        assert_eq!(data.read("a.b.1"), Some(Value::from(2)));
    }

    #[test]
    fn read_returns_none_on_missing_path() {
        let data = DeepSignal::wrap(v(json!({"a": 1})));
        assert_eq!(data.read("a.b.c"), None);
        assert_eq!(data.read("x"), None);
        assert_eq!(data.read(""), None);
    }

    #[test]
    fn write_never_creates_paths() {
        let data = DeepSignal::wrap(v(json!({"a": {"b": 1}})));
        assert!(data.write("a.b", 2));
        assert!(!data.write("a.c", 3));
        assert_eq!(data.dump(), v(json!({"a": {"b": 2}})));
    }

    #[test]
    fn child_write_is_visible_to_ancestor_observers() {
        let data = DeepSignal::wrap(v(json!({"user": {"name": "a"}})));
        let (_effect, calls) = spy(&data);
        data.write("user.name", "b");
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], v(json!({"user": {"name": "b"}})));
    }

    #[test]
    fn dump_is_alias_free() {
        let data = DeepSignal::wrap(v(json!({"list": [1]})));
        let snapshot = data.dump();
        data.get("list").unwrap().push([Value::from(2)]).unwrap();
        assert_eq!(snapshot, v(json!({"list": [1]})));
    }

    #[test]
    fn wrap_passes_deep_signals_through() {
        let data = DeepSignal::wrap(v(json!([1])));
        let again = DeepSignal::wrap(data.clone());
        assert!(again.ptr_eq(&data));
    }

    #[test]
    fn pushed_cells_keep_identity() {
        let item = DeepSignal::wrap(v(json!({"id": 1})));
        let list = DeepSignal::wrap(Value::array());
        list.push([&item]).unwrap();
        assert!(list.child("0").unwrap().ptr_eq(&item));
    }

    #[test]
    fn pop_notifies_once() {
        let data = DeepSignal::wrap(v(json!([1, 2])));
        let (_effect, calls) = spy(&data);
        assert_eq!(data.pop().unwrap(), Some(Value::from(2)));
        assert_eq!(*calls.lock(), vec![v(json!([1, 2])), v(json!([1]))]);
    }

    #[test]
    fn push_notifies_once() {
        let data = DeepSignal::wrap(v(json!([1])));
        let (_effect, calls) = spy(&data);
        assert_eq!(data.push([Value::from(2), Value::from(3)]).unwrap(), 3);
        assert_eq!(*calls.lock(), vec![v(json!([1])), v(json!([1, 2, 3]))]);
    }

    #[test]
    fn shift_and_unshift() {
        let data = DeepSignal::wrap(v(json!([1, 2])));
        assert_eq!(data.shift().unwrap(), Some(Value::from(1)));
        assert_eq!(data.unshift([Value::from(2), Value::from(3)]).unwrap(), 3);
        assert_eq!(data.dump(), v(json!([2, 3, 2])));
    }

    #[test]
    fn splice_replaces_and_removes() {
        let data = DeepSignal::wrap(v(json!([1, 2, 3])));
        let removed = data.splice(0, Some(1), [Value::from(9)]).unwrap();
        assert_eq!(removed, vec![Value::from(1)]);
        assert_eq!(data.dump(), v(json!([9, 2, 3])));

        data.splice(0, Some(1), Vec::<Value>::new()).unwrap();
        assert_eq!(data.dump(), v(json!([2, 3])));
    }

    #[test]
    fn splice_accepts_negative_start_and_open_count() {
        let data = DeepSignal::wrap(v(json!([1, 2, 3, 4])));
        let removed = data.splice(-2, None, Vec::<Value>::new()).unwrap();
        assert_eq!(removed, vec![Value::from(3), Value::from(4)]);
        assert_eq!(data.dump(), v(json!([1, 2])));
    }

    #[test]
    fn reverse_and_sort() {
        let data = DeepSignal::wrap(v(json!([1, 2, 3])));
        data.reverse().unwrap();
        assert_eq!(data.dump(), v(json!([3, 2, 1])));

        let data = DeepSignal::wrap(v(json!([2, 3, 1])));
        let (_effect, calls) = spy(&data);
        data.sort().unwrap();
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(data.dump(), v(json!([1, 2, 3])));
    }

    #[test]
    fn fill_and_copy_within() {
        let data = DeepSignal::wrap(v(json!([2, 3, 1])));
        data.fill("x", None, None).unwrap();
        assert_eq!(data.dump(), v(json!(["x", "x", "x"])));

        let data = DeepSignal::wrap(v(json!(["a", "b", "c", "d", "e"])));
        data.copy_within(0, 3, Some(4)).unwrap();
        assert_eq!(data.dump(), v(json!(["d", "b", "c", "d", "e"])));
    }

    #[test]
    fn filled_slots_are_independent() {
        let data = DeepSignal::wrap(v(json!([0, 0])));
        data.fill(v(json!({"n": 1})), None, None).unwrap();
        data.write("0.n", 5);
        assert_eq!(data.dump(), v(json!([{"n": 5}, {"n": 1}])));
    }

    #[test]
    fn sequence_helper_on_object_is_an_error() {
        let data = DeepSignal::wrap(v(json!({"a": 1})));
        let err = data.push([Value::from(1)]).unwrap_err();
        assert!(matches!(err, Error::NotAContainer { expected: "array", found: "object" }));
    }

    #[test]
    fn mapping_helper_on_leaf_is_an_error() {
        let data = DeepSignal::wrap(Value::from("text"));
        assert!(matches!(data.set("a", 1), Err(Error::NotAContainer { .. })));
    }

    #[test]
    fn set_existing_key_writes_child_cell() {
        let data = DeepSignal::wrap(v(json!({"a": 1, "b": 2})));
        let parent_writes = Arc::new(AtomicUsize::new(0));
        let counter = parent_writes.clone();
        data.subscribe(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        data.set("a", 10).unwrap();
        assert_eq!(parent_writes.load(AtomicOrdering::SeqCst), 0);

        data.set("c", 3).unwrap();
        assert_eq!(parent_writes.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(data.dump(), v(json!({"a": 10, "b": 2, "c": 3})));
        assert_eq!(data.keys().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn assign_runs_observers_once() {
        let data = DeepSignal::wrap(v(json!({"a": 1})));
        let (effect, _calls) = spy(&data);
        data.assign([("a", Value::from(2)), ("b", Value::from(3))]).unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(data.dump(), v(json!({"a": 2, "b": 3})));
    }

    #[test]
    fn delete_and_remove() {
        let data = DeepSignal::wrap(v(json!({"a": 1, "b": 2, "c": 3})));
        assert_eq!(data.delete(&["a", "missing"]).unwrap(), 1);
        assert_eq!(data.remove(|_, value| value == &Value::from(3)).unwrap(), 1);
        assert_eq!(data.dump(), v(json!({"b": 2})));
    }

    #[test]
    fn dates_are_leaves() {
        let date = chrono::Utc::now();
        let data = DeepSignal::wrap(v(json!({})));
        data.set("at", date).unwrap();
        let cell = data.get("at").unwrap();
        assert_eq!(cell.kind(), "date");
        assert!(cell.child("0").is_none());
    }

    #[test]
    fn apply_patches_writes_only_the_target_cell() {
        let data = DeepSignal::wrap(v(json!({"text": "hello", "nested": {"text": "world"}})));
        let sibling = data.get("text").unwrap();
        let sibling_writes = Arc::new(AtomicUsize::new(0));
        let counter = sibling_writes.clone();
        sibling.subscribe(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        let patches = vec![Patch::replace(vec!["nested".into(), "text".into()], Value::from("world2"))];
        data.apply_patches(&patches).unwrap();

        assert_eq!(sibling_writes.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(data.dump(), v(json!({"text": "hello", "nested": {"text": "world2"}})));
    }

    #[test]
    fn apply_patches_creates_missing_paths() {
        let data = DeepSignal::wrap(Value::object());
        let patches = vec![Patch::replace(vec!["a".into(), "b".into()], Value::from(1))];
        data.apply_patches(&patches).unwrap();
        assert_eq!(data.dump(), v(json!({"a": {"b": 1}})));
    }

    #[test]
    fn missing_branch_keeps_sibling_cells_live() {
        let data = DeepSignal::wrap(v(json!({"form": {"kept": {"x": 1}}})));
        let kept = data.get("form.kept").unwrap();
        let (_effect, seen) = spy(&kept);

        let added = vec![Patch::replace(
            vec!["form".into(), "added".into(), "leaf".into()],
            Value::from(2),
        )];
        data.apply_patches(&added).unwrap();
        assert_eq!(data.dump(), v(json!({"form": {"kept": {"x": 1}, "added": {"leaf": 2}}})));
        assert_eq!(data.get("form.kept").map(|cell| cell.id()), Some(kept.id()));
        assert_eq!(seen.lock().len(), 1);

        let edit = vec![Patch::replace(vec!["form".into(), "kept".into(), "x".into()], Value::from(5))];
        data.apply_patches(&edit).unwrap();
        assert_eq!(seen.lock().last(), Some(&v(json!({"x": 5}))));
    }

    #[test]
    fn scalar_ancestor_is_rebuilt_alone() {
        let data = DeepSignal::wrap(v(json!({"a": 1, "other": {"y": true}})));
        let other = data.get("other").unwrap();
        let patches = vec![Patch::replace(vec!["a".into(), "b".into(), "c".into()], Value::from(3))];
        data.apply_patches(&patches).unwrap();
        assert_eq!(data.dump(), v(json!({"a": {"b": {"c": 3}}, "other": {"y": true}})));
        assert_eq!(data.get("other").map(|cell| cell.id()), Some(other.id()));
    }

    #[test]
    fn apply_patches_handles_array_shrink() {
        let data = DeepSignal::wrap(v(json!({"array": [{"id": "1"}, {"id": "2"}]})));
        let old = data.dump();
        let new = v(json!({"array": [{"id": "2"}]}));
        data.apply_patches(&patch::diff(&old, &new)).unwrap();
        assert_eq!(data.dump(), new);
    }

    #[test]
    fn serializes_as_plain_json() {
        let data = DeepSignal::wrap(v(json!({"a": [1, {"b": null}]})));
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"a": [1, {"b": null}]}));
    }
}
