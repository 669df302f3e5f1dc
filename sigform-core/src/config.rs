//! Form configuration.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

static MARKER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Options for a [`SigForm`](crate::form::SigForm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Segment carried by the form's root node. Generated when absent.
    pub marker: Option<String>,
    /// Initial root document.
    pub initial_value: Value,
    /// Stage error updates and commit them on the next frame.
    pub debounce_errors: bool,
    /// Upper bound on frames run by `SigForm::settle`.
    pub max_settle_frames: usize,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            marker: None,
            initial_value: Value::object(),
            debounce_errors: true,
            max_settle_frames: 16,
        }
    }
}

impl FormConfig {
    /// Parse a JSON config document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = value.into();
        self
    }

    pub fn with_debounce_errors(mut self, debounce: bool) -> Self {
        self.debounce_errors = debounce;
        self
    }

    pub fn with_max_settle_frames(mut self, frames: usize) -> Self {
        self.max_settle_frames = frames;
        self
    }

    /// The configured marker, or a fresh `:f<N>:` one.
    pub(crate) fn resolve_marker(&self) -> String {
        self.marker.clone().unwrap_or_else(|| {
            let n = MARKER_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!(":f{n}:")
        })
    }
}
