//! Structural patches between plain values.
//!
//! A [`Patch`] describes one change as `{op, path, value}`. Patches are
//! produced by [`diff`] at a leaf, prefixed with [`wrap_patches`] while they
//! travel towards the form root, and folded into ancestors with
//! [`apply_patches`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path;
use crate::value::Value;

/// Kind of change a patch describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Replace,
    Add,
    Remove,
}

/// One structural change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    /// The same patch with its first `depth` segments dropped.
    pub fn relative_to(&self, depth: usize) -> Self {
        Self {
            op: self.op,
            path: self.path.get(depth..).unwrap_or_default().to_vec(),
            value: self.value.clone(),
        }
    }

    pub fn replace(path: Vec<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    pub fn add(path: Vec<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    /// Prepend `segments` to the patch path.
    pub fn prefix<S: AsRef<str>>(&mut self, segments: &[S]) {
        if segments.is_empty() {
            return;
        }
        let mut path: Vec<String> = segments.iter().map(|s| s.as_ref().to_owned()).collect();
        path.append(&mut self.path);
        self.path = path;
    }

    fn value_or_null(&self) -> Value {
        self.value.clone().unwrap_or_default()
    }
}

// ── Diff ───────────────────────────────────────────────────────────────────

/// Patches turning `old` into `new`.
///
/// Mappings are compared key by key, sequences index by index (growth adds
/// at the tail, shrinking removes from the end). Anything else, dates
/// included, is replaced whole. Equal values produce no patches.
pub fn diff(old: &Value, new: &Value) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    diff_into(&mut patches, &mut path, old, new);
    patches
}

fn diff_into(out: &mut Vec<Patch>, path: &mut Vec<String>, old: &Value, new: &Value) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(before), Value::Object(after)) => {
            for key in before.keys() {
                if !after.contains_key(key) {
                    path.push(key.clone());
                    out.push(Patch::remove(path.clone()));
                    path.pop();
                }
            }
            for (key, next) in after {
                path.push(key.clone());
                match before.get(key) {
                    Some(prev) => diff_into(out, path, prev, next),
                    None => out.push(Patch::add(path.clone(), next.clone())),
                }
                path.pop();
            }
        }
        (Value::Array(before), Value::Array(after)) => {
            let common = before.len().min(after.len());
            for index in 0..common {
                path.push(index.to_string());
                diff_into(out, path, &before[index], &after[index]);
                path.pop();
            }
            for (index, next) in after.iter().enumerate().skip(common) {
                path.push(index.to_string());
                out.push(Patch::add(path.clone(), next.clone()));
                path.pop();
            }
            for index in (common..before.len()).rev() {
                path.push(index.to_string());
                out.push(Patch::remove(path.clone()));
                path.pop();
            }
        }
        _ => out.push(Patch::replace(path.clone(), new.clone())),
    }
}

// ── Apply ──────────────────────────────────────────────────────────────────

/// Apply `patches` to `doc` in order.
///
/// Missing intermediate containers are created as mappings. Removing a path
/// that does not exist is a no-op. A non-numeric segment into a sequence is
/// an [`Error::InvalidPatchPath`]; patches before it stay applied.
pub fn apply_patches(doc: &mut Value, patches: &[Patch]) -> Result<()> {
    for patch in patches {
        apply_patch(doc, patch)?;
    }
    Ok(())
}

/// Apply a single patch. See [`apply_patches`].
pub fn apply_patch(doc: &mut Value, patch: &Patch) -> Result<()> {
    let Some((key, parents)) = patch.path.split_last() else {
        match patch.op {
            PatchOp::Remove => *doc = Value::Null,
            PatchOp::Replace | PatchOp::Add => *doc = patch.value_or_null(),
        }
        return Ok(());
    };

    if patch.op == PatchOp::Remove {
        return apply_remove(doc, &patch.path, parents, key);
    }

    let parent = walk_creating(doc, &patch.path, parents)?;
    let value = patch.value_or_null();
    match parent {
        Value::Object(map) => {
            // Existing keys keep their position.
            map.insert(key.clone(), value);
        }
        Value::Array(items) => {
            let index = parse_index(key, &patch.path)?;
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(value);
            } else if patch.op == PatchOp::Add {
                items.insert(index, value);
            } else {
                items[index] = value;
            }
        }
        slot => {
            let mut map = crate::value::Map::new();
            map.insert(key.clone(), value);
            *slot = Value::Object(map);
        }
    }
    Ok(())
}

fn apply_remove(doc: &mut Value, full: &[String], parents: &[String], key: &str) -> Result<()> {
    let mut current = doc;
    for segment in parents {
        current = match current {
            Value::Object(map) => match map.get_mut(segment) {
                Some(child) => child,
                None => return Ok(()),
            },
            Value::Array(items) => match items.get_mut(parse_index(segment, full)?) {
                Some(child) => child,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
    }
    match current {
        Value::Object(map) => {
            map.shift_remove(key);
        }
        Value::Array(items) => {
            let index = parse_index(key, full)?;
            if index < items.len() {
                items.remove(index);
            }
        }
        _ => {}
    }
    Ok(())
}

fn walk_creating<'a>(doc: &'a mut Value, full: &[String], parents: &[String]) -> Result<&'a mut Value> {
    let mut current = doc;
    for segment in parents {
        if let Value::Array(items) = current {
            let index = parse_index(segment, full)?;
            if index >= items.len() {
                items.resize(index + 1, Value::object());
            }
            current = &mut items[index];
            continue;
        }
        if !matches!(current, Value::Object(_)) {
            *current = Value::object();
        }
        current = match current {
            Value::Object(map) => map.entry(segment.clone()).or_insert_with(Value::object),
            _ => return Err(Error::InvalidPatchPath { path: full.to_vec() }),
        };
    }
    Ok(current)
}

fn parse_index(segment: &str, full: &[String]) -> Result<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| Error::InvalidPatchPath { path: full.to_vec() })
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Prefix every patch path with the segments of `name`.
pub fn wrap_patches(patches: &mut [Patch], name: &str) {
    let segments = path::parse_path(name);
    for patch in patches {
        patch.prefix(&segments);
    }
}

/// Run `recipe` on a copy of `value` and return the result with the patches
/// describing what changed.
///
/// With a `name`, patch paths are prefixed by it, as a field reports its own
/// change relative to its parent.
pub fn mutate<F>(value: &Value, recipe: F, name: Option<&str>) -> (Value, Vec<Patch>)
where
    F: FnOnce(&mut Value),
{
    let mut next = value.clone();
    recipe(&mut next);
    let mut patches = diff(value, &next);
    if let Some(name) = name {
        wrap_patches(&mut patches, name);
    }
    (next, patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equal_values_produce_no_patches() {
        let doc = v(json!({"a": [1, {"b": 2}]}));
        assert!(diff(&doc, &doc.clone()).is_empty());
    }

    #[test]
    fn scalar_change_is_root_replace() {
        let patches = diff(&Value::from("hello"), &Value::from("world"));
        assert_eq!(patches, vec![Patch::replace(vec![], Value::from("world"))]);
    }

    #[test]
    fn object_diff_is_key_scoped() {
        let old = v(json!({"text": "hello", "nested": {"text": "world"}}));
        let new = v(json!({"text": "hello", "nested": {"text": "world2"}, "extra": 1}));
        let patches = diff(&old, &new);
        assert_eq!(
            patches,
            vec![
                Patch::replace(p(&["nested", "text"]), Value::from("world2")),
                Patch::add(p(&["extra"]), Value::from(1)),
            ]
        );
    }

    #[test]
    fn array_shrink_removes_from_the_end() {
        let old = v(json!([1, 2, 3, 4]));
        let new = v(json!([2]));
        let patches = diff(&old, &new);
        assert_eq!(
            patches,
            vec![
                Patch::replace(p(&["0"]), Value::from(2)),
                Patch::remove(p(&["3"])),
                Patch::remove(p(&["2"])),
                Patch::remove(p(&["1"])),
            ]
        );
        let mut doc = old.clone();
        apply_patches(&mut doc, &patches).unwrap();
        assert_eq!(doc, new);
    }

    #[test]
    fn diff_then_apply_reconstructs() {
        let old = v(json!({"todos": [{"id": 1}], "gone": true, "n": {"x": [1, 2]}}));
        let new = v(json!({"todos": [{"id": 1, "done": true}, {"id": 2}], "n": {"x": []}}));
        let mut doc = old.clone();
        apply_patches(&mut doc, &diff(&old, &new)).unwrap();
        assert_eq!(doc, new);
    }

    #[test]
    fn apply_creates_missing_intermediates() {
        let mut doc = Value::object();
        apply_patch(&mut doc, &Patch::replace(p(&["a", "b"]), Value::from(1))).unwrap();
        assert_eq!(doc, v(json!({"a": {"b": 1}})));
    }

    #[test]
    fn remove_of_missing_path_is_noop() {
        let mut doc = v(json!({"a": 1}));
        apply_patch(&mut doc, &Patch::remove(p(&["x", "y"]))).unwrap();
        assert_eq!(doc, v(json!({"a": 1})));
    }

    #[test]
    fn non_numeric_index_is_rejected() {
        let mut doc = v(json!({"list": [1]}));
        let err = apply_patch(&mut doc, &Patch::replace(p(&["list", "x"]), Value::Null));
        assert!(matches!(err, Err(Error::InvalidPatchPath { .. })));
    }

    #[test]
    fn wrap_patches_prefixes_dotted_names() {
        let mut patches = vec![Patch::replace(vec![], Value::from("world2"))];
        wrap_patches(&mut patches, "nested.text");
        assert_eq!(patches[0].path, p(&["nested", "text"]));
    }

    #[test]
    fn mutate_reports_named_patches() {
        let (next, patches) = mutate(&Value::from("hello"), |v| *v = Value::from("world"), Some("text"));
        assert_eq!(next, Value::from("world"));
        assert_eq!(patches, vec![Patch::replace(p(&["text"]), Value::from("world"))]);

        let (_, raw) = mutate(&Value::from("hello"), |v| *v = Value::from("world"), None);
        assert_eq!(raw[0].path, Vec::<String>::new());
    }

    #[test]
    fn patches_serialize_lowercase() {
        let json = serde_json::to_value(Patch::remove(p(&["a"]))).unwrap();
        assert_eq!(json, json!({"op": "remove", "path": ["a"]}));
    }
}
