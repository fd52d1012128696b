use async_trait::async_trait;
use sofa_query::MangoQuery;

use crate::error::StoreError;
use crate::wire::{
    BulkResult, CreateIndexRequest, CreateIndexResponse, Document, FetchRow, FindResponse,
    ViewOptions, ViewResponse, WriteResponse,
};

/// The primitives a CouchDB database exposes to the adapter.
///
/// Implementations own transport, authentication and session renewal; the
/// adapter only sees documents and CouchDB error bodies.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write one document. An existing document is replaced only when the
    /// supplied `_rev` matches the current revision.
    async fn insert(&self, doc: Document) -> Result<WriteResponse, StoreError>;

    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResponse, StoreError>;

    /// Write many documents in one request. Documents carrying
    /// `_deleted: true` are deletions. Failures are reported per entry.
    async fn bulk(&self, docs: Vec<Document>) -> Result<Vec<BulkResult>, StoreError>;

    /// Fetch many documents by id. Missing ids come back as error rows.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError>;

    async fn find(&self, query: &MangoQuery) -> Result<FindResponse, StoreError>;

    async fn create_index(
        &self,
        request: &CreateIndexRequest,
    ) -> Result<CreateIndexResponse, StoreError>;

    async fn view(
        &self,
        ddoc: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<ViewResponse, StoreError>;
}
