use std::marker::PhantomData;

use sofa_query::MangoQuery;
use sofa_store::DocumentStore;
use tracing::debug;

use crate::adapter::Adapter;
use crate::error::DbError;
use crate::model::Model;
use crate::statement::{Rows, decode_rows};

/// Forward-only pages over a query, driven by store bookmarks.
///
/// Page 1 runs the query as built. Every later page resumes from the
/// bookmark returned by the page before it, so pages must be requested in
/// order. A limit, when given, caps the rows returned across all pages.
pub struct Paginator<M, S> {
    adapter: Adapter<S>,
    query: MangoQuery,
    size: usize,
    limit: Option<usize>,
    fetched: usize,
    current: usize,
    bookmark: Option<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: DocumentStore> Paginator<M, S> {
    pub(crate) fn new(
        adapter: Adapter<S>,
        query: MangoQuery,
        size: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            adapter,
            query,
            size,
            limit,
            fetched: 0,
            current: 0,
            bookmark: None,
            _model: PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Last page fetched, 0 before the first fetch.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }

    pub async fn page(&mut self, n: usize) -> Result<Rows<M>, DbError> {
        let mut query = self.query.clone();
        match n {
            0 => return Err(DbError::Paging("page numbers start at 1".into())),
            1 => query.bookmark = None,
            _ => {
                let Some(bookmark) = self.bookmark.clone() else {
                    return Err(DbError::Paging(
                        "No bookmark. Did you start in the first page?".into(),
                    ));
                };
                if n != self.current + 1 {
                    return Err(DbError::Paging(format!(
                        "page {n} cannot follow page {}; bookmarks only move forward",
                        self.current
                    )));
                }
                query.bookmark = Some(bookmark);
                query.skip = None;
            }
        }

        let fetched = if n == 1 { 0 } else { self.fetched };
        let size = match self.limit {
            Some(limit) => self.size.min(limit.saturating_sub(fetched)),
            None => self.size,
        };
        if size == 0 {
            debug!(page = n, "limit reached");
            self.current = n;
            return decode_rows(Vec::new(), query.fields.is_some(), self.adapter.revisions());
        }
        query.limit = Some(size);

        let response = self.adapter.raw(&query).await?;
        debug!(page = n, rows = response.docs.len(), "fetched page");
        self.bookmark = response.bookmark;
        self.fetched = fetched + response.docs.len();
        self.current = n;
        decode_rows(
            response.docs,
            query.fields.is_some(),
            self.adapter.revisions(),
        )
    }

    pub async fn next(&mut self) -> Result<Rows<M>, DbError> {
        let n = self.current + 1;
        self.page(n).await
    }

    pub fn total(&self) -> Result<usize, DbError> {
        Err(DbError::Unsupported(
            "The total pages api is not available for couchdb".into(),
        ))
    }

    pub fn count(&self) -> Result<usize, DbError> {
        Err(DbError::Unsupported(
            "The record count api is not available for couchdb".into(),
        ))
    }
}
