//! Error types for the form engine.
//!
//! Only structural invariant violations are represented here. Lookups and
//! propagation that target a field which is no longer registered are not
//! errors: the engine absorbs them. Validation problems are data and live in
//! the form's error map.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Integration misuse detected by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A structural helper (push, splice, set, ...) was invoked on a cell
    /// holding the wrong kind of value.
    #[error("expected {expected} cell, found {found}")]
    NotAContainer {
        expected: &'static str,
        found: &'static str,
    },

    /// The ancestor walk ran out of nodes before reaching the form root.
    #[error("form root `{marker}` not found above field (collected {collected:?}); is the field rendered inside a form?")]
    FormRootNotFound {
        marker: String,
        collected: Vec<String>,
    },

    /// A patch path steps into a sequence with a non-numeric segment.
    #[error("patch path {path:?} cannot be applied")]
    InvalidPatchPath { path: Vec<String> },

    /// Form configuration could not be parsed.
    #[error("invalid form config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}
