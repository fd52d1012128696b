use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_REVISION_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Row cap applied to queries that set no limit.
    pub query_limit: usize,
    /// Page size used when scanning every match for a client-side aggregate.
    pub page_size: usize,
    /// Document ids whose last seen revision is kept for updates and deletes.
    pub revision_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            query_limit: 250,
            page_size: 250,
            revision_capacity: DEFAULT_REVISION_CAPACITY,
        }
    }
}
