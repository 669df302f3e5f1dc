//! Validation errors keyed by dotted field name.
//!
//! Errors are data, not failures: they annotate fields and never block
//! mutation. Updates can be staged and committed on the next frame so that
//! a clear followed by a set within one update is never observed halfway.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::reactive::Signal;
use crate::value::Value;

/// Error payload of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldError {
    Message(String),
    Messages(Vec<String>),
}

impl FieldError {
    /// All messages, in order.
    pub fn messages(&self) -> Vec<&str> {
        match self {
            FieldError::Message(message) => vec![message.as_str()],
            FieldError::Messages(messages) => messages.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        FieldError::Message(message.to_owned())
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        FieldError::Message(message)
    }
}

impl From<Vec<String>> for FieldError {
    fn from(messages: Vec<String>) -> Self {
        FieldError::Messages(messages)
    }
}

/// Dotted field name to error payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMap(IndexMap<String, FieldError>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a nested error document into dotted keys.
    ///
    /// Strings become messages and sequences of strings become message
    /// lists. Empty strings and nulls are skipped.
    pub fn from_nested(value: &Value) -> Self {
        let mut map = ErrorMap::new();
        collect_nested(&mut map, String::new(), value);
        map
    }

    pub fn get(&self, name: &str) -> Option<&FieldError> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, error: impl Into<FieldError>) {
        self.0.insert(name.into(), error.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldError> {
        self.0.shift_remove(name)
    }

    /// Shallow merge: entries of `other` overwrite entries with the same key.
    pub fn merge(&mut self, other: ErrorMap) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldError)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, E: Into<FieldError>> FromIterator<(K, E)> for ErrorMap {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> Self {
        ErrorMap(iter.into_iter().map(|(k, e)| (k.into(), e.into())).collect())
    }
}

fn collect_nested(out: &mut ErrorMap, prefix: String, value: &Value) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Null => {}
        Value::String(message) if message.is_empty() => {}
        Value::String(message) => out.insert(prefix, message.as_str()),
        Value::Array(items) if items.iter().all(|item| item.as_str().is_some()) => {
            let messages: Vec<String> = items.iter().filter_map(Value::as_str).map(str::to_owned).collect();
            if !messages.is_empty() {
                out.insert(prefix, messages);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_nested(out, join(&index.to_string()), item);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_nested(out, join(key), item);
            }
        }
        other => out.insert(prefix, other.to_string()),
    }
}

/// Committed errors plus the update staged for the next frame.
pub(crate) struct ErrorState {
    committed: Signal<ErrorMap>,
    staged: Mutex<Option<ErrorMap>>,
    debounce: bool,
}

impl ErrorState {
    pub(crate) fn new(debounce: bool) -> Self {
        Self {
            committed: Signal::new(ErrorMap::new()),
            staged: Mutex::new(None),
            debounce,
        }
    }

    /// Compute the next map from the latest (staged or committed) one.
    ///
    /// Returns `true` when the update was staged and needs a flush.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ErrorMap)) -> bool {
        let mut staged = self.staged.lock();
        let mut next = match staged.take() {
            Some(map) => map,
            None => self.committed.get_untracked(),
        };
        f(&mut next);
        if self.debounce {
            *staged = Some(next);
            true
        } else {
            drop(staged);
            self.committed.set(next);
            false
        }
    }

    /// Commit the staged update, if any.
    pub(crate) fn flush(&self) {
        let staged = self.staged.lock().take();
        if let Some(next) = staged {
            if next != self.committed.get_untracked() {
                self.committed.set(next);
            }
        }
    }

    /// Committed errors. Tracked inside reactive contexts.
    pub(crate) fn committed(&self) -> ErrorMap {
        self.committed.get()
    }

    pub(crate) fn has_staged(&self) -> bool {
        self.staged.lock().is_some()
    }
}
