//! In-memory rendering tree.
//!
//! [`NodeTree`] is a small arena of named nodes standing in for whatever
//! view tree a host renders. Hosts and tests build it, mount fields on its
//! nodes, and rename or remove nodes as their view changes. [`TreeAnchor`]
//! exposes a node through [`FieldNode`] so the form can discover names.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::discovery::FieldNode;

/// Unique identifier for a node in a [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct NodeData {
    segment: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Shared handle to a tree of rendering nodes. Clones share the tree.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: Arc<RwLock<HashMap<NodeId, NodeData>>>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parentless node carrying a form marker.
    pub fn root(&self, marker: &str) -> NodeId {
        self.insert(Some(marker.to_owned()), None)
    }

    /// Create a child of `parent`, optionally named.
    ///
    /// A missing parent yields a detached node.
    pub fn append(&self, parent: NodeId, segment: Option<&str>) -> NodeId {
        self.insert(segment.map(str::to_owned), Some(parent))
    }

    fn insert(&self, segment: Option<String>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId::new();
        let mut nodes = self.nodes.write();
        let parent = parent.filter(|p| nodes.contains_key(p));
        if let Some(parent) = parent.and_then(|p| nodes.get_mut(&p)) {
            parent.children.push(id);
        }
        nodes.insert(
            id,
            NodeData {
                segment,
                parent,
                children: Vec::new(),
            },
        );
        id
    }

    /// Remove `id` and everything below it. Returns the number of nodes
    /// removed.
    pub fn remove(&self, id: NodeId) -> usize {
        let mut nodes = self.nodes.write();
        let Some(parent) = nodes.get(&id).map(|n| n.parent) else {
            return 0;
        };
        if let Some(parent) = parent.and_then(|p| nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = nodes.remove(&next) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    /// Rename a node. `None` turns it into a pass-through.
    pub fn set_segment(&self, id: NodeId, segment: Option<&str>) {
        if let Some(node) = self.nodes.write().get_mut(&id) {
            node.segment = segment.map(str::to_owned);
        }
    }

    pub fn segment(&self, id: NodeId) -> Option<String> {
        self.nodes.read().get(&id).and_then(|n| n.segment.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.read().get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .read()
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle on `id` usable for name discovery.
    pub fn anchor(&self, id: NodeId) -> TreeAnchor {
        TreeAnchor {
            tree: self.clone(),
            id,
        }
    }
}

/// A node of a [`NodeTree`] seen through [`FieldNode`].
#[derive(Debug, Clone)]
pub struct TreeAnchor {
    tree: NodeTree,
    id: NodeId,
}

impl TreeAnchor {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl FieldNode for TreeAnchor {
    fn name_segment(&self) -> Option<String> {
        self.tree.segment(self.id)
    }

    fn parent_node(&self) -> Option<Self> {
        self.tree.parent(self.id).map(|id| self.tree.anchor(id))
    }
}
