//! Field trees and the rendering-tree boundary.
//!
//! The engine never sees a concrete view tree. It asks a [`FieldNode`] for
//! its local name segment and its parent, and [`compute_field_tree`] turns
//! that walk into a [`FieldTree`]. [`NodeTree`] is the in-memory
//! implementation used by tests and simple hosts.

mod arena;
mod discovery;

pub use arena::{NodeId, NodeTree, TreeAnchor};
pub use discovery::{compute_field_tree, FieldNode, FieldTree};
