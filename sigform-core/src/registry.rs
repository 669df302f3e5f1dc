//! Per-form field registry.
//!
//! Records are kept sorted by name so that enumeration always goes from
//! short to long names: a parent comes before any of its descendants.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::deep::DeepSignal;
use crate::path;
use crate::tree::FieldTree;
use crate::value::Value;

/// A registered field.
#[derive(Debug, Clone)]
pub struct FieldRecord {
    pub name: String,
    pub field_tree: FieldTree,
    pub cell: DeepSignal,
    /// Value last seen by propagation. Diffs are computed against it, and
    /// the engine updates it before writing into `cell` so its own writes
    /// are not propagated twice.
    pub snapshot: Arc<Mutex<Value>>,
}

impl FieldRecord {
    pub fn new(field_tree: FieldTree, cell: DeepSignal) -> Self {
        let snapshot = Arc::new(Mutex::new(cell.dump_untracked()));
        Self {
            name: field_tree.name(),
            field_tree,
            cell,
            snapshot,
        }
    }

    /// Current plain value of the field.
    pub fn value(&self) -> Value {
        self.cell.dump_untracked()
    }
}

/// Name-sorted set of live field records.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    records: Vec<FieldRecord>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `record`, replacing any record with the same name.
    ///
    /// Returns the replaced record.
    pub fn register(&mut self, record: FieldRecord) -> Option<FieldRecord> {
        let replaced = self.unregister(&record.name);
        tracing::debug!(name = %record.name, replaced = replaced.is_some(), "register field");
        self.records.push(record);
        self.records.sort_by(|a, b| a.name.cmp(&b.name));
        replaced
    }

    /// Remove the record named `name`. Missing names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<FieldRecord> {
        let index = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&FieldRecord> {
        self.records
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.records[index])
    }

    /// Current value of the field named `name`.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.get(name).map(FieldRecord::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Records from shortest to longest name.
    pub fn iter(&self) -> impl Iterator<Item = &FieldRecord> {
        self.records.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Assemble a document from every registered field.
    ///
    /// Values are written short to long, so a child's value overrides the
    /// stale copy held by its parent. With a `prefix`, only the
    /// sub-document under it is returned (`Null` when absent).
    pub fn form_data(&self, prefix: Option<&str>) -> Value {
        let mut doc = Value::object();
        for record in &self.records {
            path::set(&mut doc, &record.name, record.value());
        }
        match prefix {
            Some(prefix) => path::get(&doc, prefix).cloned().unwrap_or_default(),
            None => doc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, value: serde_json::Value) -> FieldRecord {
        FieldRecord::new(FieldTree::from(name), DeepSignal::wrap(value))
    }

    fn sample() -> FieldRegistry {
        let mut registry = FieldRegistry::new();
        for (name, value) in [
            ("obj", json!({"propA": "empty", "propB": "value"})),
            ("obj.propA", json!("hello")),
            ("obj.propB", json!("world!")),
            ("otherObj", json!({"hoge": "fuga"})),
            ("otherObj.hoge", json!("piyo")),
            ("array", json!([{"name": "Taro Yamada"}])),
            ("array.0", json!({"name": "Jiro Yamada"})),
            ("array.0.name", json!("Saburo Yamada")),
        ] {
            registry.register(record(name, value));
        }
        registry
    }

    #[test]
    fn enumerates_short_to_long() {
        let mut registry = FieldRegistry::new();
        registry.register(record("a.b.c", json!(1)));
        registry.register(record("a", json!({})));
        registry.register(record("a.b", json!({})));
        assert_eq!(registry.names(), vec!["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn reregistering_replaces() {
        let mut registry = FieldRegistry::new();
        registry.register(record("x", json!(1)));
        let replaced = registry.register(record("x", json!(2)));
        assert_eq!(replaced.map(|r| r.value()), Some(Value::from(1)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_value("x"), Some(Value::from(2)));
    }

    #[test]
    fn missing_names_are_noops() {
        let mut registry = FieldRegistry::new();
        assert!(registry.unregister("ghost").is_none());
        assert!(registry.get("ghost").is_none());
        assert_eq!(registry.get_value("ghost"), None);
    }

    #[test]
    fn form_data_prefers_longer_names() {
        let doc = sample().form_data(None);
        assert_eq!(
            doc,
            Value::from(json!({
                "array": [{"name": "Saburo Yamada"}],
                "obj": {"propA": "hello", "propB": "world!"},
                "otherObj": {"hoge": "piyo"},
            }))
        );
    }

    #[test]
    fn form_data_with_prefix() {
        let doc = sample().form_data(Some("obj"));
        assert_eq!(doc, Value::from(json!({"propA": "hello", "propB": "world!"})));
    }

    #[test]
    fn registration_order_does_not_matter() {
        let mut a = FieldRegistry::new();
        a.register(record(":Rm:.obj.propA", json!("helloa")));
        a.register(record(":Rm:.obj", json!({"propA": "hello"})));

        let mut b = FieldRegistry::new();
        b.register(record(":Rm:.obj", json!({"propA": "hello"})));
        b.register(record(":Rm:.obj.propA", json!("helloa")));

        let expected = Value::from(json!({":Rm:": {"obj": {"propA": "helloa"}}}));
        assert_eq!(a.form_data(None), expected);
        assert_eq!(b.form_data(None), expected);
    }
}
