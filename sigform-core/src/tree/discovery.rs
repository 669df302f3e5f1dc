//! Field name discovery.
//!
//! A field's full name is not declared anywhere; it is read off the
//! rendering tree. Every node may carry a local name segment, and the form
//! root carries the form's marker. Walking from the field's own node up to
//! the marker and reversing the collected segments gives the field tree.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Ancestor walk over some rendering tree.
///
/// Implementations are cheap handles (ids, `Rc`s, ...) onto a node.
pub trait FieldNode: Clone {
    /// Name assigned to this node, if any. The form root reports its marker.
    fn name_segment(&self) -> Option<String>;

    /// The node this one is rendered inside of.
    fn parent_node(&self) -> Option<Self>;
}

/// Ordered name segments from the form root down to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldTree(SmallVec<[String; 4]>);

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dotted full name, e.g. `todos.0.task`.
    pub fn name(&self) -> String {
        self.0.join(".")
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The field's own segment within its parent.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Tree of the enclosing field. Empty for top-level fields.
    pub fn parent(&self) -> FieldTree {
        let mut segments = self.0.clone();
        segments.pop();
        FieldTree(segments)
    }

    /// Append a segment.
    pub fn child(&self, segment: impl Into<String>) -> FieldTree {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        FieldTree(segments)
    }
}

impl fmt::Display for FieldTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldTree {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        FieldTree(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for FieldTree {
    /// Parse a dotted name. Empty segments are dropped.
    fn from(name: &str) -> Self {
        name.split('.').filter(|s| !s.is_empty()).collect()
    }
}

/// Walk from `node` up to the ancestor carrying `marker`.
///
/// Nodes without a segment are pass-throughs. Fails with
/// [`Error::FormRootNotFound`] when the chain ends before the marker, which
/// means the field is rendered outside of its form.
pub fn compute_field_tree<N: FieldNode>(node: &N, marker: &str) -> Result<FieldTree> {
    let mut collected: Vec<String> = Vec::new();
    let mut current = node.clone();
    loop {
        let segment = current.name_segment().unwrap_or_default();
        if segment == marker {
            break;
        }
        collected.push(segment);
        current = match current.parent_node() {
            Some(parent) => parent,
            None => {
                collected.retain(|s| !s.is_empty());
                collected.reverse();
                return Err(Error::FormRootNotFound {
                    marker: marker.to_owned(),
                    collected,
                });
            }
        };
    }
    Ok(collected.into_iter().rev().filter(|s| !s.is_empty()).collect())
}
