use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};
use sofa_store::DocumentStore;

use crate::adapter::{Adapter, Record};
use crate::error::DbError;
use crate::identity::generate_id;
use crate::model::{KeyValue, Model, ModelSchema};
use crate::statement::Statement;
use crate::transcode::model_to_attributes;

/// Last known revision per document id, holding at most `capacity` ids.
/// Once full, the least recently recorded id is dropped first.
#[derive(Debug)]
pub struct RevisionTable {
    capacity: usize,
    revs: RwLock<Revisions>,
}

#[derive(Debug, Default)]
struct Revisions {
    seq: u64,
    by_id: HashMap<String, (u64, String)>,
    order: BTreeMap<u64, String>,
}

impl Default for RevisionTable {
    fn default() -> Self {
        Self::with_capacity(crate::config::DEFAULT_REVISION_CAPACITY)
    }
}

impl RevisionTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            revs: RwLock::new(Revisions::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.revs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, id: &str, rev: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut revs = self.revs.write().unwrap_or_else(PoisonError::into_inner);
        revs.seq += 1;
        let seq = revs.seq;
        if let Some((old, _)) = revs.by_id.insert(id.to_string(), (seq, rev.to_string())) {
            revs.order.remove(&old);
        }
        revs.order.insert(seq, id.to_string());
        while revs.by_id.len() > self.capacity {
            let Some((_, oldest)) = revs.order.pop_first() else {
                break;
            };
            revs.by_id.remove(&oldest);
        }
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.revs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(id)
            .map(|(_, rev)| rev.clone())
    }

    pub fn forget(&self, id: &str) {
        let mut revs = self.revs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((seq, _)) = revs.by_id.remove(id) {
            revs.order.remove(&seq);
        }
    }
}

/// Typed access to one model's records.
///
/// Models stay plain data: revisions live in the adapter's
/// [`RevisionTable`], keyed by document id.
pub struct Repository<M, S> {
    adapter: Adapter<S>,
    _model: PhantomData<fn() -> M>,
}

impl<M, S> Clone for Repository<M, S> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model, S: DocumentStore> Repository<M, S> {
    pub(crate) fn new(adapter: Adapter<S>) -> Self {
        Self {
            adapter,
            _model: PhantomData,
        }
    }

    fn schema(&self) -> &'static ModelSchema {
        M::schema()
    }

    fn table(&self) -> &'static str {
        &M::schema().table
    }

    pub fn select(&self) -> Statement<M, S> {
        self.adapter.statement::<M>()
    }

    /// Revision last seen for the record with `key`.
    pub fn revision(&self, key: &KeyValue) -> Option<String> {
        let id = generate_id(self.table(), key).ok()?;
        self.adapter.revisions().get(&id)
    }

    fn validated(&self, model: &M) -> Result<Map<String, Value>, DbError> {
        model.validate().map_err(DbError::Validation)?;
        model_to_attributes(model)
    }

    fn key_of(&self, attributes: &Map<String, Value>) -> Option<KeyValue> {
        let pk = &self.schema().primary_key;
        attributes
            .get(&pk.attribute)
            .filter(|v| !v.is_null())
            .and_then(|v| KeyValue::from_json(pk.kind, v))
    }

    fn require_key(&self, attributes: &Map<String, Value>) -> Result<KeyValue, DbError> {
        self.key_of(attributes).ok_or_else(|| {
            DbError::Internal(format!(
                "No value for the Id is defined under the property {}",
                self.schema().primary_key.attribute
            ))
        })
    }

    /// Keys for records about to be created, drawing missing ones from the
    /// model's sequence.
    async fn assign_keys(&self, batch: &mut [Map<String, Value>]) -> Result<Vec<KeyValue>, DbError> {
        let schema = self.schema();
        let pk = &schema.primary_key;
        let missing = batch.iter().filter(|a| self.key_of(a).is_none()).count();
        let mut generated = match (&pk.sequence, schema.sequence_name()) {
            (Some(options), Some(name)) if missing > 0 => self
                .adapter
                .sequence(&name, pk.kind, options)
                .range(missing)
                .await?
                .into_iter(),
            _ => Vec::new().into_iter(),
        };
        let mut keys = Vec::with_capacity(batch.len());
        for attributes in batch.iter_mut() {
            let key = match self.key_of(attributes) {
                Some(key) => key,
                None => {
                    let key = generated.next().ok_or_else(|| {
                        DbError::Internal(format!(
                            "No value for the Id is defined under the property {}",
                            pk.attribute
                        ))
                    })?;
                    attributes.insert(pk.attribute.clone(), key.to_json());
                    key
                }
            };
            keys.push(key);
        }
        Ok(keys)
    }

    fn finish(&self, record: Record) -> Result<M, DbError> {
        self.adapter.revisions().record(&record.id, &record.rev);
        Ok(serde_json::from_value(Value::Object(record.attributes))?)
    }

    pub async fn create(&self, model: M) -> Result<M, DbError> {
        let mut batch = [self.validated(&model)?];
        let keys = self.assign_keys(&mut batch).await?;
        let [attributes] = batch;
        let record = self.adapter.create(self.table(), &keys[0], &attributes).await?;
        self.finish(record)
    }

    pub async fn create_all(&self, models: Vec<M>) -> Result<Vec<M>, DbError> {
        let mut batch = models
            .iter()
            .map(|m| self.validated(m))
            .collect::<Result<Vec<_>, _>>()?;
        let keys = self.assign_keys(&mut batch).await?;
        let records = self.adapter.create_all(self.table(), &keys, &batch).await?;
        records.into_iter().map(|r| self.finish(r)).collect()
    }

    pub async fn read(&self, key: impl Into<KeyValue>) -> Result<M, DbError> {
        let record = self.adapter.read(self.table(), &key.into()).await?;
        self.finish(record)
    }

    pub async fn read_all(&self, keys: &[KeyValue]) -> Result<Vec<M>, DbError> {
        let records = self.adapter.read_all(self.table(), keys).await?;
        records.into_iter().map(|r| self.finish(r)).collect()
    }

    /// Write `model` over the stored record. The record must have been
    /// read, created or queried through this adapter first.
    pub async fn update(&self, model: M) -> Result<M, DbError> {
        let attributes = self.validated(&model)?;
        let key = self.require_key(&attributes)?;
        let rev = self.revision(&key);
        let record = self
            .adapter
            .update(self.table(), &key, &attributes, rev.as_deref())
            .await?;
        self.finish(record)
    }

    pub async fn update_all(&self, models: Vec<M>) -> Result<Vec<M>, DbError> {
        let batch = models
            .iter()
            .map(|m| self.validated(m))
            .collect::<Result<Vec<_>, _>>()?;
        let keys = batch
            .iter()
            .map(|a| self.require_key(a))
            .collect::<Result<Vec<_>, _>>()?;
        let revs: Vec<_> = keys.iter().map(|k| self.revision(k)).collect();
        let records = self
            .adapter
            .update_all(self.table(), &keys, &batch, &revs)
            .await?;
        records.into_iter().map(|r| self.finish(r)).collect()
    }

    pub async fn delete(&self, key: impl Into<KeyValue>) -> Result<M, DbError> {
        let record = self.adapter.delete(self.table(), &key.into()).await?;
        self.adapter.revisions().forget(&record.id);
        Ok(serde_json::from_value(Value::Object(record.attributes))?)
    }

    pub async fn delete_all(&self, keys: &[KeyValue]) -> Result<Vec<M>, DbError> {
        let records = self.adapter.delete_all(self.table(), keys).await?;
        records
            .into_iter()
            .map(|r| {
                self.adapter.revisions().forget(&r.id);
                Ok(serde_json::from_value(Value::Object(r.attributes))?)
            })
            .collect()
    }
}
