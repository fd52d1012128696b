use serde_json::{Map, Value};
use sofa_store::DocumentStore;
use tracing::debug;

use crate::adapter::Adapter;
use crate::error::DbError;
use crate::keys::SEQUENCE;
use crate::model::{KeyKind, KeyValue, SequenceOptions};

const CURRENT: &str = "current";

/// A named counter stored as a document in the sequence table.
pub struct Sequence<S> {
    adapter: Adapter<S>,
    name: String,
    kind: KeyKind,
    start_with: i128,
    increment_by: i128,
}

impl<S: DocumentStore> Sequence<S> {
    pub(crate) fn new(adapter: Adapter<S>, name: &str, kind: KeyKind, options: &SequenceOptions) -> Self {
        Self {
            adapter,
            name: name.to_string(),
            kind,
            start_with: options.start_with,
            increment_by: options.increment_by,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> KeyValue {
        KeyValue::Text(self.name.clone())
    }

    fn parse(&self, value: Option<&Value>) -> Result<i128, DbError> {
        let parsed = match (self.kind, value) {
            (KeyKind::Text, _) => {
                return Err(DbError::Internal(format!(
                    "sequence {} needs a numeric key kind",
                    self.name
                )));
            }
            (_, Some(Value::Number(n))) => n.as_i64().map(i128::from),
            (_, Some(Value::String(s))) => s.parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            DbError::Internal(format!(
                "Failed to retrieve current value for sequence {}: {value:?}",
                self.name
            ))
        })
    }

    fn typed(&self, n: i128) -> Result<KeyValue, DbError> {
        match self.kind {
            KeyKind::Number => i64::try_from(n).map(KeyValue::Number).map_err(|_| {
                DbError::Internal(format!("sequence {} overflowed at {n}", self.name))
            }),
            KeyKind::BigInt => Ok(KeyValue::BigInt(n)),
            KeyKind::Text => Err(DbError::Internal(format!(
                "sequence {} needs a numeric key kind",
                self.name
            ))),
        }
    }

    fn stored(&self, n: i128) -> Value {
        match self.kind {
            KeyKind::BigInt => Value::String(n.to_string()),
            _ => i64::try_from(n).map(Value::from).unwrap_or(Value::Null),
        }
    }

    pub async fn current(&self) -> Result<KeyValue, DbError> {
        match self.adapter.read(SEQUENCE, &self.key()).await {
            Ok(record) => self.typed(self.parse(record.attributes.get(CURRENT))?),
            Err(DbError::NotFound(_)) => self.typed(self.start_with),
            Err(e) => Err(e),
        }
    }

    /// Move the counter `steps` increments forward; returns the value it
    /// held before.
    async fn advance(&self, steps: i128) -> Result<i128, DbError> {
        let key = self.key();
        let (previous, rev) = match self.adapter.read(SEQUENCE, &key).await {
            Ok(record) => (self.parse(record.attributes.get(CURRENT))?, Some(record.rev)),
            Err(DbError::NotFound(_)) => (self.start_with, None),
            Err(e) => return Err(e),
        };
        let next = previous + steps * self.increment_by;
        self.typed(next)?;

        let mut attributes = Map::new();
        attributes.insert("id".to_string(), Value::String(self.name.clone()));
        attributes.insert(CURRENT.to_string(), self.stored(next));
        match rev {
            Some(rev) => self.adapter.update(SEQUENCE, &key, &attributes, Some(&rev)).await?,
            None => self.adapter.create(SEQUENCE, &key, &attributes).await?,
        };
        debug!(sequence = %self.name, current = %next, "sequence advanced");
        Ok(previous)
    }

    pub async fn next(&self) -> Result<KeyValue, DbError> {
        let previous = self.advance(1).await?;
        self.typed(previous + self.increment_by)
    }

    /// Reserve `count` consecutive values with a single write.
    pub async fn range(&self, count: usize) -> Result<Vec<KeyValue>, DbError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let previous = self.advance(count as i128).await?;
        (1..=count as i128)
            .map(|i| self.typed(previous + i * self.increment_by))
            .collect()
    }
}
