//! Sigform Core
//!
//! This crate provides a reactive form-state engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects) with batching
//! - Deep signals: nested documents where every leaf and container is its
//!   own reactive cell
//! - Field discovery from the host's rendering tree
//! - Upward propagation of field edits as path-addressed patches
//!
//! # Architecture
//!
//! - `reactive`: core reactive primitives and dependency tracking
//! - `value`, `path`, `patch`: the plain document model and its edits
//! - `deep`: reactive trees over documents
//! - `tree`: field-name discovery over host nodes
//! - `registry`: registered fields, sorted by name
//! - `form`: the form container and the propagation engine
//!
//! # Example
//!
//! ```rust
//! use sigform_core::{NodeTree, SigForm, Value};
//!
//! let form = SigForm::default();
//! let tree = NodeTree::new();
//! let root = tree.root(form.marker());
//! let user = tree.append(root, Some("user"));
//! let name = tree.append(user, Some("name"));
//!
//! let user_field = form.mount_field(tree.anchor(user), None);
//! let name_field = form.mount_field(tree.anchor(name), Some(Value::from("Taro")));
//! form.settle().unwrap();
//!
//! name_field.set("Hanako");
//! assert_eq!(user_field.value().child("name"), Some(&Value::from("Hanako")));
//! assert_eq!(form.field_value("user.name"), Some(Value::from("Hanako")));
//! ```

pub mod config;
pub mod deep;
pub mod error;
pub mod form;
pub mod patch;
pub mod path;
pub mod reactive;
pub mod registry;
pub mod tree;
pub mod value;

pub use config::FormConfig;
pub use deep::DeepSignal;
pub use error::{Error, Result};
pub use form::{ErrorMap, Field, FieldError, FieldId, FieldPhase, SigForm};
pub use patch::{Patch, PatchOp};
pub use tree::{FieldNode, FieldTree, NodeTree};
pub use value::{Map, Value};
