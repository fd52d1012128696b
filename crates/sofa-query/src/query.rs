use serde::{Deserialize, Serialize};

use crate::selector::Selector;
use crate::sort::Sort;

/// The body of a Mango `_find` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MangoQuery {
    pub selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

impl MangoQuery {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    /// A copy of this query resumed from `bookmark`.
    pub fn with_bookmark(&self, bookmark: Option<String>) -> Self {
        Self {
            bookmark,
            ..self.clone()
        }
    }
}
