use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use imbl::OrdMap;
use serde_json::{Map, Value};
use sofa_query::{MangoQuery, SortDirection};

use super::matcher::{collate, lookup, matches};
use crate::client::DocumentStore;
use crate::error::StoreError;
use crate::wire::{
    BulkResult, CreateIndexRequest, CreateIndexResponse, Document, FetchRow, FindResponse,
    ViewOptions, ViewResponse, WriteResponse,
};

pub(crate) type Documents = OrdMap<String, Document>;

/// CouchDB's `_find` limit when the request carries none.
const DEFAULT_FIND_LIMIT: usize = 25;
const BOOKMARK_PREFIX: &str = "g1A";

/// Number of calls made to each primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub insert: usize,
    pub get: usize,
    pub destroy: usize,
    pub bulk: usize,
    pub fetch: usize,
    pub find: usize,
    pub create_index: usize,
    pub view: usize,
}

#[derive(Default)]
struct Counters {
    insert: AtomicUsize,
    get: AtomicUsize,
    destroy: AtomicUsize,
    bulk: AtomicUsize,
    fetch: AtomicUsize,
    find: AtomicUsize,
    create_index: AtomicUsize,
    view: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, AtomicOrdering::Relaxed);
}

/// An in-process CouchDB stand-in.
///
/// Documents live in a persistent map swapped atomically on every write, so
/// `find` reads a consistent snapshot without holding the write lock.
/// Selectors are evaluated with CouchDB collation. Views cannot run map
/// functions here; their results are registered with [`MemoryStore::stub_view`].
pub struct MemoryStore {
    docs: ArcSwap<Documents>,
    write_lock: Mutex<()>,
    indexes: Mutex<BTreeMap<String, CreateIndexRequest>>,
    views: Mutex<HashMap<(String, String), ViewResponse>>,
    counters: Counters,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: ArcSwap::new(Arc::new(OrdMap::new())),
            write_lock: Mutex::new(()),
            indexes: Mutex::new(BTreeMap::new()),
            views: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Register the response returned for `ddoc/view`.
    pub fn stub_view(&self, ddoc: &str, view: &str, response: ViewResponse) {
        if let Ok(mut views) = self.views.lock() {
            views.insert((ddoc.to_string(), view.to_string()), response);
        }
    }

    /// Names of the indexes created so far.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes
            .lock()
            .map(|idx| idx.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn index(&self, name: &str) -> Option<CreateIndexRequest> {
        self.indexes.lock().ok()?.get(name).cloned()
    }

    pub fn calls(&self) -> Calls {
        let c = &self.counters;
        let load = |a: &AtomicUsize| a.load(AtomicOrdering::Relaxed);
        Calls {
            insert: load(&c.insert),
            get: load(&c.get),
            destroy: load(&c.destroy),
            bulk: load(&c.bulk),
            fetch: load(&c.fetch),
            find: load(&c.find),
            create_index: load(&c.create_index),
            view: load(&c.view),
        }
    }

    /// Live (non-deleted) documents, design documents included.
    pub fn len(&self) -> usize {
        self.docs.load().values().filter(|d| !is_deleted(d)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|e| StoreError::Transport(format!("write lock poisoned: {e}")))
    }

    /// Apply `f` to a private copy of the document map and publish it.
    fn write<T>(&self, f: impl FnOnce(&mut Documents) -> T) -> Result<T, StoreError> {
        let _guard = self.lock_writes()?;
        let mut docs = (**self.docs.load()).clone();
        let out = f(&mut docs);
        self.docs.store(Arc::new(docs));
        Ok(out)
    }

    fn run_find(&self, query: &MangoQuery) -> Result<FindResponse, StoreError> {
        let indexes = self
            .indexes
            .lock()
            .map_err(|e| StoreError::Transport(format!("index lock poisoned: {e}")))?;
        for sort in &query.sort {
            let covered = indexes
                .values()
                .any(|req| req.index.field_names().contains(&sort.field.as_str()));
            if !covered {
                return Err(StoreError::bad_request(
                    "no_usable_index",
                    "No index exists for this sort, try indexing by the sort fields.",
                ));
            }
        }
        let has_indexes = !indexes.is_empty();
        drop(indexes);

        let snapshot = self.docs.load();
        let selector = query.selector.as_map();
        let mut hits = Vec::new();
        for (id, doc) in snapshot.iter() {
            if id.starts_with("_design/") || is_deleted(doc) {
                continue;
            }
            if matches(doc, selector)? {
                hits.push(doc.clone());
            }
        }

        if !query.sort.is_empty() {
            hits.sort_by(|a, b| {
                for sort in &query.sort {
                    let ord = match (lookup(a, &sort.field), lookup(b, &sort.field)) {
                        (Some(x), Some(y)) => collate(x, y),
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let ord = match sort.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let start = match &query.bookmark {
            Some(b) => parse_bookmark(b)?,
            None => 0,
        } + query.skip.unwrap_or(0);
        let limit = query.limit.unwrap_or(DEFAULT_FIND_LIMIT);

        let docs: Vec<Document> = hits
            .into_iter()
            .skip(start)
            .take(limit)
            .map(|d| project(d, query.fields.as_deref()))
            .collect();
        let consumed = start + docs.len();
        let warning = (!has_indexes)
            .then(|| "No matching index found, create an index to optimize query time.".to_string());

        Ok(FindResponse {
            docs,
            bookmark: Some(format!("{BOOKMARK_PREFIX}{consumed}")),
            warning,
            execution_stats: None,
        })
    }
}

fn is_deleted(doc: &Document) -> bool {
    doc.get("_deleted").and_then(Value::as_bool).unwrap_or(false)
}

fn parse_bookmark(bookmark: &str) -> Result<usize, StoreError> {
    bookmark
        .strip_prefix(BOOKMARK_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| StoreError::bad_request("invalid_bookmark", format!("Invalid bookmark value: {bookmark}")))
}

fn project(doc: Document, fields: Option<&[String]>) -> Document {
    match fields {
        None => doc,
        Some(fields) => doc
            .into_iter()
            .filter(|(k, _)| fields.iter().any(|f| f == k))
            .collect(),
    }
}

fn doc_id(doc: &Document) -> Option<String> {
    doc.get("_id").and_then(Value::as_str).map(str::to_string)
}

fn doc_rev(doc: &Document) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

fn generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

fn next_rev(previous: Option<&str>, doc: &Document) -> String {
    let mut hasher = DefaultHasher::new();
    previous.unwrap_or("").hash(&mut hasher);
    Value::Object(doc.clone()).to_string().hash(&mut hasher);
    let generation = previous.map(generation).unwrap_or(0) + 1;
    format!("{generation}-{:016x}", hasher.finish())
}

/// Write a single document under CouchDB revision rules.
fn put(docs: &mut Documents, mut doc: Document) -> Result<WriteResponse, StoreError> {
    let Some(id) = doc_id(&doc) else {
        return Err(StoreError::bad_request("bad_request", "Document must have an _id"));
    };
    let supplied = doc_rev(&doc).map(str::to_string);
    let current = docs.get(&id);
    let previous = match current {
        Some(existing) if !is_deleted(existing) => {
            let current_rev = doc_rev(existing).map(str::to_string);
            if supplied.is_none() || supplied != current_rev {
                return Err(StoreError::conflict());
            }
            current_rev
        }
        Some(tombstone) => {
            if supplied.is_some() && supplied.as_deref() != doc_rev(tombstone) {
                return Err(StoreError::conflict());
            }
            doc_rev(tombstone).map(str::to_string)
        }
        None => {
            if supplied.is_some() {
                return Err(StoreError::conflict());
            }
            None
        }
    };
    let deleting = is_deleted(&doc);
    if deleting && previous.is_none() {
        return Err(StoreError::not_found("missing"));
    }
    let rev = next_rev(previous.as_deref(), &doc);
    if deleting {
        doc = Map::new();
        doc.insert("_id".into(), Value::String(id.clone()));
        doc.insert("_deleted".into(), Value::Bool(true));
    }
    doc.insert("_rev".into(), Value::String(rev.clone()));
    docs.insert(id.clone(), doc);
    Ok(WriteResponse { ok: true, id, rev })
}

fn error_parts(err: &StoreError) -> (String, String) {
    match err {
        StoreError::Http { error, reason, .. } => (error.clone(), reason.clone()),
        StoreError::Transport(msg) => ("unknown_error".into(), msg.clone()),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, doc: Document) -> Result<WriteResponse, StoreError> {
        bump(&self.counters.insert);
        self.write(|docs| put(docs, doc))?
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        bump(&self.counters.get);
        match self.docs.load().get(id) {
            Some(doc) if is_deleted(doc) => Err(StoreError::not_found("deleted")),
            Some(doc) => Ok(doc.clone()),
            None => Err(StoreError::not_found("missing")),
        }
    }

    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResponse, StoreError> {
        bump(&self.counters.destroy);
        let mut tombstone = Map::new();
        tombstone.insert("_id".into(), Value::String(id.to_string()));
        tombstone.insert("_rev".into(), Value::String(rev.to_string()));
        tombstone.insert("_deleted".into(), Value::Bool(true));
        self.write(|docs| match docs.get(id).map(is_deleted) {
            Some(false) => put(docs, tombstone),
            Some(true) => Err(StoreError::not_found("deleted")),
            None => Err(StoreError::not_found("missing")),
        })?
    }

    async fn bulk(&self, batch: Vec<Document>) -> Result<Vec<BulkResult>, StoreError> {
        bump(&self.counters.bulk);
        self.write(|docs| {
            batch
                .into_iter()
                .map(|doc| {
                    let id = doc_id(&doc);
                    match put(docs, doc) {
                        Ok(resp) => BulkResult {
                            id: Some(resp.id),
                            rev: Some(resp.rev),
                            ..BulkResult::default()
                        },
                        Err(err) => {
                            let (error, reason) = error_parts(&err);
                            BulkResult {
                                id,
                                rev: None,
                                error: Some(error),
                                reason: Some(reason),
                            }
                        }
                    }
                })
                .collect()
        })
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError> {
        bump(&self.counters.fetch);
        let snapshot = self.docs.load();
        Ok(ids
            .iter()
            .map(|id| match snapshot.get(id) {
                Some(doc) if !is_deleted(doc) => FetchRow {
                    id: id.clone(),
                    doc: Some(doc.clone()),
                    error: None,
                },
                _ => FetchRow {
                    id: id.clone(),
                    doc: None,
                    error: Some("not_found".into()),
                },
            })
            .collect())
    }

    async fn find(&self, query: &MangoQuery) -> Result<FindResponse, StoreError> {
        bump(&self.counters.find);
        self.run_find(query)
    }

    async fn create_index(
        &self,
        request: &CreateIndexRequest,
    ) -> Result<CreateIndexResponse, StoreError> {
        bump(&self.counters.create_index);
        if request.index.fields.is_empty() {
            return Err(StoreError::bad_request("bad_request", "Index fields must not be empty"));
        }
        let mut indexes = self
            .indexes
            .lock()
            .map_err(|e| StoreError::Transport(format!("index lock poisoned: {e}")))?;
        let ddoc = request.ddoc.clone().unwrap_or_else(|| request.name.clone());
        let result = if indexes.contains_key(&request.name) {
            "exists"
        } else {
            indexes.insert(request.name.clone(), request.clone());
            "created"
        };
        Ok(CreateIndexResponse {
            result: result.to_string(),
            id: format!("_design/{ddoc}"),
            name: request.name.clone(),
        })
    }

    async fn view(
        &self,
        ddoc: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<ViewResponse, StoreError> {
        bump(&self.counters.view);
        let views = self
            .views
            .lock()
            .map_err(|e| StoreError::Transport(format!("view lock poisoned: {e}")))?;
        let mut response = views
            .get(&(ddoc.to_string(), view.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found("missing_named_view"))?;
        if options.include_docs != Some(true) {
            for row in &mut response.rows {
                row.doc = None;
            }
        }
        Ok(response)
    }
}
