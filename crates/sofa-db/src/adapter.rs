use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use sofa_query::MangoQuery;
use sofa_store::{
    BulkResult, Document, DocumentStore, FindResponse, ViewOptions, ViewResponse,
};
use tracing::{debug, warn};

use crate::config::AdapterConfig;
use crate::error::{BatchFailure, DbError};
use crate::identity::generate_id;
use crate::index::generate_indexes;
use crate::keys::{DELETED, ID, REV};
use crate::model::{KeyKind, KeyValue, Model, ModelSchema, SequenceOptions};
use crate::repository::{Repository, RevisionTable};
use crate::sequence::Sequence;
use crate::statement::Statement;
use crate::transcode::{strip, strip_store_fields, to_document};
use crate::view::{DesignDocument, ViewDefinition, generate_views};

/// A stored record as the adapter sees it: attributes without store fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub key: KeyValue,
    pub rev: String,
    pub attributes: Map<String, Value>,
}

struct Inner<S> {
    store: S,
    config: AdapterConfig,
    registry: RwLock<BTreeMap<String, &'static ModelSchema>>,
    revisions: RevisionTable,
}

/// CRUD, query and bootstrap operations over one CouchDB database.
///
/// Cloning is cheap; clones share the store, the registered models and the
/// revision table.
pub struct Adapter<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Adapter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn bulk_failures(results: &[BulkResult]) -> Vec<BatchFailure> {
    results
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            r.error.as_ref().map(|error| BatchFailure {
                index,
                error: error.clone(),
                reason: r.reason.clone(),
            })
        })
        .collect()
}

fn check_lengths(keys: usize, models: usize) -> Result<(), DbError> {
    if keys != models {
        return Err(DbError::Internal(
            "Ids and models must have the same length".to_string(),
        ));
    }
    Ok(())
}

fn rev_of(doc: &Document) -> Result<String, DbError> {
    doc.get(REV)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbError::Internal("store returned a document without a revision".into()))
}

impl<S: DocumentStore> Adapter<S> {
    pub fn new(store: S, config: AdapterConfig) -> Self {
        let revisions = RevisionTable::with_capacity(config.revision_capacity);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                registry: RwLock::new(BTreeMap::new()),
                revisions,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn revisions(&self) -> &RevisionTable {
        &self.inner.revisions
    }

    /// Make a model known to [`Adapter::initialize`].
    pub fn register(&self, schema: &'static ModelSchema) -> Result<(), DbError> {
        schema.check()?;
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.table.clone(), schema);
        Ok(())
    }

    pub fn schemas(&self) -> Vec<&'static ModelSchema> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .collect()
    }

    pub fn statement<M: Model>(&self) -> Statement<M, S> {
        Statement::new(self.clone())
    }

    pub fn repository<M: Model>(&self) -> Result<Repository<M, S>, DbError> {
        self.register(M::schema())?;
        Ok(Repository::new(self.clone()))
    }

    pub fn sequence(&self, name: &str, kind: KeyKind, options: &SequenceOptions) -> Sequence<S> {
        Sequence::new(self.clone(), name, kind, options)
    }

    // ── Single records ──────────────────────────────────────────

    pub async fn create(
        &self,
        table: &str,
        key: &KeyValue,
        attributes: &Map<String, Value>,
    ) -> Result<Record, DbError> {
        let id = generate_id(table, key)?;
        let doc = to_document(table, &id, attributes)?;
        let written = self
            .inner
            .store
            .insert(doc)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        Ok(Record {
            id,
            key: key.clone(),
            rev: written.rev,
            attributes: attributes.clone(),
        })
    }

    pub async fn read(&self, table: &str, key: &KeyValue) -> Result<Record, DbError> {
        let id = generate_id(table, key)?;
        let doc = self
            .inner
            .store
            .get(&id)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        self.record_from(table, key, doc)
    }

    /// Replace a record. `rev` must be the revision last seen for it.
    pub async fn update(
        &self,
        table: &str,
        key: &KeyValue,
        attributes: &Map<String, Value>,
        rev: Option<&str>,
    ) -> Result<Record, DbError> {
        let Some(rev) = rev else {
            return Err(DbError::Internal(format!(
                "No revision number found for record with id {key}"
            )));
        };
        let id = generate_id(table, key)?;
        let mut doc = to_document(table, &id, attributes)?;
        doc.insert(REV.to_string(), Value::String(rev.to_string()));
        let written = self
            .inner
            .store
            .insert(doc)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        Ok(Record {
            id,
            key: key.clone(),
            rev: written.rev,
            attributes: attributes.clone(),
        })
    }

    /// Delete a record and return it as it was.
    pub async fn delete(&self, table: &str, key: &KeyValue) -> Result<Record, DbError> {
        let id = generate_id(table, key)?;
        let doc = self
            .inner
            .store
            .get(&id)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        let record = self.record_from(table, key, doc)?;
        self.inner
            .store
            .destroy(&id, &record.rev)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        Ok(record)
    }

    fn record_from(&self, table: &str, key: &KeyValue, doc: Document) -> Result<Record, DbError> {
        let schema_pk = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .map(|s| s.primary_key.attribute.clone());
        let id = generate_id(table, key)?;
        let rev = rev_of(&doc)?;
        let attributes = match schema_pk {
            Some(pk) => strip(doc, &pk, key),
            None => strip_store_fields(doc),
        };
        Ok(Record {
            id,
            key: key.clone(),
            rev,
            attributes,
        })
    }

    // ── Bulk ────────────────────────────────────────────────────

    pub async fn create_all(
        &self,
        table: &str,
        keys: &[KeyValue],
        attributes: &[Map<String, Value>],
    ) -> Result<Vec<Record>, DbError> {
        check_lengths(keys.len(), attributes.len())?;
        let ids = keys
            .iter()
            .map(|k| generate_id(table, k))
            .collect::<Result<Vec<_>, _>>()?;
        let docs = ids
            .iter()
            .zip(attributes)
            .map(|(id, attrs)| to_document(table, id, attrs))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_bulk(ids, keys, attributes, docs).await
    }

    pub async fn update_all(
        &self,
        table: &str,
        keys: &[KeyValue],
        attributes: &[Map<String, Value>],
        revs: &[Option<String>],
    ) -> Result<Vec<Record>, DbError> {
        check_lengths(keys.len(), attributes.len())?;
        check_lengths(keys.len(), revs.len())?;
        if let Some(i) = revs.iter().position(Option::is_none) {
            return Err(DbError::Internal(format!(
                "No revision number found for record with id {}",
                keys[i]
            )));
        }
        let ids = keys
            .iter()
            .map(|k| generate_id(table, k))
            .collect::<Result<Vec<_>, _>>()?;
        let mut docs = Vec::with_capacity(ids.len());
        for ((id, attrs), rev) in ids.iter().zip(attributes).zip(revs) {
            let mut doc = to_document(table, id, attrs)?;
            if let Some(rev) = rev {
                doc.insert(REV.to_string(), Value::String(rev.clone()));
            }
            docs.push(doc);
        }
        self.write_bulk(ids, keys, attributes, docs).await
    }

    async fn write_bulk(
        &self,
        ids: Vec<String>,
        keys: &[KeyValue],
        attributes: &[Map<String, Value>],
        docs: Vec<Document>,
    ) -> Result<Vec<Record>, DbError> {
        let results = self.inner.store.bulk(docs).await?;
        let failures = bulk_failures(&results);
        if !failures.is_empty() {
            return Err(DbError::Batch(failures));
        }
        Ok(ids
            .into_iter()
            .zip(keys)
            .zip(attributes)
            .zip(results)
            .map(|(((id, key), attrs), result)| Record {
                id,
                key: key.clone(),
                rev: result.rev.unwrap_or_default(),
                attributes: attrs.clone(),
            })
            .collect())
    }

    /// Fetch the documents behind `keys`, failing if any is missing.
    async fn fetch_all(&self, table: &str, keys: &[KeyValue]) -> Result<Vec<Document>, DbError> {
        let ids = keys
            .iter()
            .map(|k| generate_id(table, k))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self.inner.store.fetch(&ids).await?;
        let missing: Vec<_> = rows
            .iter()
            .filter(|r| r.doc.is_none())
            .map(|r| format!("{} ({})", r.id, r.error.as_deref().unwrap_or("missing")))
            .collect();
        if !missing.is_empty() {
            return Err(DbError::NotFound(format!(
                "records not found: {}",
                missing.join(", ")
            )));
        }
        Ok(rows.into_iter().filter_map(|r| r.doc).collect())
    }

    pub async fn read_all(&self, table: &str, keys: &[KeyValue]) -> Result<Vec<Record>, DbError> {
        let docs = self.fetch_all(table, keys).await?;
        keys.iter()
            .zip(docs)
            .map(|(key, doc)| self.record_from(table, key, doc))
            .collect()
    }

    pub async fn delete_all(&self, table: &str, keys: &[KeyValue]) -> Result<Vec<Record>, DbError> {
        let docs = self.fetch_all(table, keys).await?;
        let records = keys
            .iter()
            .zip(docs)
            .map(|(key, doc)| self.record_from(table, key, doc))
            .collect::<Result<Vec<_>, _>>()?;
        let tombstones = records
            .iter()
            .map(|r| {
                let mut doc = Document::new();
                doc.insert(ID.to_string(), Value::String(r.id.clone()));
                doc.insert(REV.to_string(), Value::String(r.rev.clone()));
                doc.insert(DELETED.to_string(), Value::Bool(true));
                doc
            })
            .collect();
        let results = self.inner.store.bulk(tombstones).await?;
        let failures = bulk_failures(&results);
        if !failures.is_empty() {
            return Err(DbError::Batch(failures));
        }
        Ok(records)
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Run a Mango query as given.
    pub async fn raw(&self, query: &MangoQuery) -> Result<FindResponse, DbError> {
        let response = self.inner.store.find(query).await?;
        if let Some(warning) = &response.warning {
            warn!(%warning, "store warning");
        }
        Ok(response)
    }

    /// Like [`Adapter::raw`], returning the documents only.
    pub async fn raw_docs(&self, query: &MangoQuery) -> Result<Vec<Document>, DbError> {
        Ok(self.raw(query).await?.docs)
    }

    pub async fn view(
        &self,
        ddoc: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<ViewResponse, DbError> {
        self.inner
            .store
            .view(ddoc, view, options)
            .await
            .map_err(|e| DbError::from_store_for(e, &format!("{ddoc}/{view}")))
    }

    // ── Bootstrap ───────────────────────────────────────────────

    /// Create every index the models need. Existing indexes are skipped.
    pub async fn index(&self, schemas: &[&ModelSchema]) -> Result<(), DbError> {
        for request in generate_indexes(schemas)? {
            match self.inner.store.create_index(&request).await {
                Ok(response) if response.result == "exists" => {
                    debug!(name = %request.name, "index already exists");
                }
                Ok(_) => debug!(name = %request.name, "index created"),
                Err(e) => match DbError::from_store_for(e, &request.name) {
                    DbError::Conflict(msg) if msg.contains("exist") => {
                        debug!(name = %request.name, "index already exists");
                    }
                    other => return Err(other),
                },
            }
        }
        Ok(())
    }

    /// Create indexes and design documents for every registered model.
    /// Design documents that already hold the same views are left alone.
    pub async fn initialize(&self) -> Result<(), DbError> {
        let schemas = self.schemas();
        self.index(&schemas).await?;
        for mut ddoc in generate_views(&schemas) {
            match self.inner.store.get(&ddoc.id).await {
                Ok(existing) => {
                    let current: Option<BTreeMap<String, ViewDefinition>> = existing
                        .get("views")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok());
                    if current.as_ref() == Some(&ddoc.views) {
                        debug!(ddoc = %ddoc.id, "design document up to date");
                        continue;
                    }
                    ddoc.rev = Some(rev_of(&existing)?);
                }
                Err(e) if e.status() == Some(404) => {}
                Err(e) => return Err(DbError::from_store_for(e, &ddoc.id)),
            }
            self.put_design(ddoc).await?;
        }
        Ok(())
    }

    async fn put_design(&self, ddoc: DesignDocument) -> Result<(), DbError> {
        let id = ddoc.id.clone();
        let Value::Object(doc) = serde_json::to_value(&ddoc)? else {
            return Err(DbError::Internal("design document must be an object".into()));
        };
        self.inner
            .store
            .insert(doc)
            .await
            .map_err(|e| DbError::from_store_for(e, &id))?;
        debug!(ddoc = %id, views = ddoc.views.len(), "design document written");
        Ok(())
    }
}
