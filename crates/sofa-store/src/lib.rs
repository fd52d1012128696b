mod client;
mod error;
mod wire;

pub use client::DocumentStore;
pub use error::StoreError;
pub use wire::{
    BulkResult, CreateIndexRequest, CreateIndexResponse, Document, FetchRow, FindResponse,
    IndexDefinition, ViewOptions, ViewResponse, ViewRow, WriteResponse,
};

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::{Calls, MemoryStore, collate};
