use std::fmt;

use serde_json::Value;

/// A non-fatal observation made while building a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A merged clause replaced an existing top-level selector key.
    SelectorKeyOverridden {
        key: String,
        previous: Value,
        replacement: Value,
    },
    /// No limit was given, so the default row cap was applied.
    DefaultLimitApplied { limit: usize },
    /// Free-form warning passed back by the document store.
    Store(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SelectorKeyOverridden {
                key,
                previous,
                replacement,
            } => write!(
                f,
                "a {key} query param is about to be overridden: {previous} by {replacement}"
            ),
            Warning::DefaultLimitApplied { limit } => {
                write!(f, "no limit selector defined, using default limit of {limit}")
            }
            Warning::Store(msg) => write!(f, "store warning: {msg}"),
        }
    }
}

/// Collects warnings produced by the pure builders so callers decide how
/// (and whether) to surface them.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Warning> + '_ {
        self.warnings.drain(..)
    }
}
