//! Dotted-path utilities over plain values.
//!
//! Paths look like `a.b.0.c` or `a.b[0].c`; dots and brackets both separate
//! segments and empty segments are ignored. Numeric segments index into
//! sequences, everything else keys into mappings.

use smallvec::SmallVec;

use crate::value::{Map, Value};

/// Parsed path segments.
pub type Segments = SmallVec<[String; 4]>;

/// Split a dotted path into segments.
pub fn parse_path(path: &str) -> Segments {
    path.split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Value at `path`, or `None` when any segment is absent.
///
/// An empty path yields `None`, never the value itself.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return None;
    }
    get_segments(value, &segments)
}

/// Value at already split `segments`. An empty slice yields `value`.
pub fn get_segments<'a, S: AsRef<str>>(value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.child(segment.as_ref()))
}

/// Value at `path`, falling back to `default` when absent.
pub fn get_or(value: &Value, path: &str, default: Value) -> Value {
    get(value, path).cloned().unwrap_or(default)
}

/// Write `new` at `path`, creating intermediate mappings as needed.
///
/// Intermediate scalars are replaced by mappings. Inside sequences a numeric
/// segment equal to the length appends, a larger one pads with `Null`.
/// An empty path replaces `value` itself.
pub fn set(value: &mut Value, path: &str, new: Value) {
    set_segments(value, &parse_path(path), new);
}

/// [`set`] over already split segments.
pub fn set_segments<S: AsRef<str>>(value: &mut Value, segments: &[S], new: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *value = new;
        return;
    };
    if let Some(slot) = child_slot(value, first.as_ref()) {
        set_segments(slot, rest, new);
    }
}

/// Mutable child for `segment`, creating it when missing.
///
/// A slot that cannot hold `segment` (a scalar, or a sequence addressed by
/// a key) becomes an empty mapping first.
fn child_slot<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    let index = segment.parse::<usize>().ok();
    let fits = match value {
        Value::Array(_) => index.is_some(),
        Value::Object(_) => true,
        _ => false,
    };
    if !fits {
        *value = Value::object();
    }
    match (value, index) {
        (Value::Array(items), Some(index)) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        (Value::Object(map), _) => Some(map.entry(segment.to_owned()).or_insert(Value::Null)),
        _ => None,
    }
}

/// Remove the value at `segments`, returning it. Missing paths are a no-op.
pub fn remove_segments<S: AsRef<str>>(value: &mut Value, segments: &[S]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut current = value;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(segment.as_ref())?,
            Value::Array(items) => items.get_mut(segment.as_ref().parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(map) => map.shift_remove(last.as_ref()),
        Value::Array(items) => {
            let index = last.as_ref().parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Apply every dotted key of `flat` onto a copy of `target`.
///
/// Keys are applied in order, so a later, longer key overrides the part of
/// an earlier value it points into.
pub fn merge_flatten<'a, I>(target: &Value, flat: I) -> Value
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let mut next = target.clone();
    for (key, value) in flat {
        set(&mut next, key, value.clone());
    }
    next
}

/// Flatten nested mappings/sequences into dotted keys.
///
/// Empty containers and scalars are kept as leaves.
pub fn flatten(value: &Value) -> Map {
    let mut out = Map::new();
    flatten_into(&mut out, String::new(), value);
    out
}

fn flatten_into(out: &mut Map, prefix: String, value: &Value) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(out, join(key), child);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(out, join(&index.to_string()), child);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}
