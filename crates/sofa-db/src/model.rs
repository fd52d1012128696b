use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sofa_query::{Condition, SortDirection};

use crate::error::DbError;
use crate::keys;

/// Value type of a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Text,
    Number,
    BigInt,
}

/// A parsed primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Text(String),
    Number(i64),
    BigInt(i128),
}

impl KeyValue {
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Text(s) => Value::String(s.clone()),
            KeyValue::Number(n) => Value::from(*n),
            KeyValue::BigInt(n) => i64::try_from(*n)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(n.to_string())),
        }
    }

    /// Read a key of `kind` out of a model attribute. Numeric kinds accept
    /// numeric strings.
    pub fn from_json(kind: KeyKind, value: &Value) -> Option<KeyValue> {
        match (kind, value) {
            (KeyKind::Text, Value::String(s)) => Some(KeyValue::Text(s.clone())),
            (KeyKind::Text, Value::Number(n)) => Some(KeyValue::Text(n.to_string())),
            (KeyKind::Number, Value::Number(n)) => n.as_i64().map(KeyValue::Number),
            (KeyKind::Number, Value::String(s)) => s.parse().ok().map(KeyValue::Number),
            (KeyKind::BigInt, Value::Number(n)) => n.as_i64().map(|n| KeyValue::BigInt(n.into())),
            (KeyKind::BigInt, Value::String(s)) => s.parse().ok().map(KeyValue::BigInt),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Text(s) => f.write_str(s),
            KeyValue::Number(n) => write!(f, "{n}"),
            KeyValue::BigInt(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Text(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Text(s)
    }
}

impl From<i64> for KeyValue {
    fn from(n: i64) -> Self {
        KeyValue::Number(n)
    }
}

impl From<i128> for KeyValue {
    fn from(n: i128) -> Self {
        KeyValue::BigInt(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    Text,
    Number,
    Boolean,
    Date,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceOptions {
    /// Counter document name. Defaults to `<table>_<pk attribute>`.
    pub name: Option<String>,
    pub start_with: i128,
    pub increment_by: i128,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            name: None,
            start_with: 0,
            increment_by: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub attribute: String,
    pub kind: KeyKind,
    pub sequence: Option<SequenceOptions>,
}

impl PrimaryKey {
    pub fn new(attribute: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            attribute: attribute.into(),
            kind,
            sequence: None,
        }
    }

    pub fn generated(mut self, options: SequenceOptions) -> Self {
        self.sequence = Some(options);
        self
    }
}

/// A secondary index on one attribute, optionally composed with others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub attribute: String,
    pub compositions: Vec<String>,
    /// Ordered variants to create. Empty means both directions.
    pub directions: Vec<SortDirection>,
}

impl IndexSpec {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            compositions: Vec::new(),
            directions: Vec::new(),
        }
    }

    pub fn composed(mut self, compositions: &[&str]) -> Self {
        self.compositions = compositions.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn directed(mut self, directions: &[SortDirection]) -> Self {
        self.directions = directions.to_vec();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    View,
    GroupBy,
    Count,
    Sum,
    Max,
    Min,
    Distinct,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::View => "view",
            ViewKind::GroupBy => "groupBy",
            ViewKind::Count => "count",
            ViewKind::Sum => "sum",
            ViewKind::Max => "max",
            ViewKind::Min => "min",
            ViewKind::Distinct => "distinct",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a view map function emits as the row value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewValue {
    /// The whole document.
    Doc,
    /// One or more document fields.
    Fields(Vec<String>),
    /// A constant. On count views it also restricts rows to documents whose
    /// attribute equals the constant.
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleMode {
    Any,
    All,
}

/// Access guard compiled into a view map function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewAuth {
    /// A raw JavaScript boolean expression over `doc`.
    Expression(String),
    Roles {
        field: String,
        roles: Vec<String>,
        mode: RoleMode,
    },
}

/// A materialized view declared on a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub kind: ViewKind,
    pub attribute: String,
    pub name: Option<String>,
    pub ddoc: Option<String>,
    pub key: Option<Vec<String>>,
    pub value: Option<ViewValue>,
    pub map: Option<String>,
    pub reduce: Option<String>,
    pub condition: Option<Condition>,
    pub auth: Option<ViewAuth>,
    pub compositions: Vec<String>,
    pub directions: Vec<SortDirection>,
    pub return_docs: bool,
}

impl ViewSpec {
    pub fn new(kind: ViewKind, attribute: impl Into<String>) -> Self {
        Self {
            kind,
            attribute: attribute.into(),
            name: None,
            ddoc: None,
            key: None,
            value: None,
            map: None,
            reduce: None,
            condition: None,
            auth: None,
            compositions: Vec::new(),
            directions: Vec::new(),
            return_docs: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_ddoc(mut self, ddoc: impl Into<String>) -> Self {
        self.ddoc = Some(ddoc.into());
        self
    }

    pub fn keyed(mut self, key: &[&str]) -> Self {
        self.key = Some(key.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn valued(mut self, value: ViewValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.map = Some(map.into());
        self
    }

    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn guarded(mut self, auth: ViewAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn composed(mut self, compositions: &[&str]) -> Self {
        self.compositions = compositions.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn directed(mut self, directions: &[SortDirection]) -> Self {
        self.directions = directions.to_vec();
        self
    }

    pub fn returning_docs(mut self) -> Self {
        self.return_docs = true;
        self
    }

    /// Emitted key fields: the explicit key, else the attribute followed by
    /// its compositions.
    pub fn key_fields(&self) -> Vec<String> {
        match &self.key {
            Some(key) => key.clone(),
            None => std::iter::once(self.attribute.clone())
                .chain(self.compositions.iter().cloned())
                .collect(),
        }
    }
}

/// Everything the adapter needs to know about a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub table: String,
    pub primary_key: PrimaryKey,
    pub attributes: BTreeMap<String, AttributeType>,
    pub indexes: Vec<IndexSpec>,
    pub default_query_attributes: Vec<String>,
    pub views: Vec<ViewSpec>,
}

impl ModelSchema {
    pub fn new(table: impl Into<String>, primary_key: PrimaryKey) -> Self {
        Self {
            table: table.into(),
            primary_key,
            attributes: BTreeMap::new(),
            indexes: Vec::new(),
            default_query_attributes: Vec::new(),
            views: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.insert(name.into(), ty);
        self
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    pub fn default_query(mut self, attribute: impl Into<String>) -> Self {
        self.default_query_attributes.push(attribute.into());
        self
    }

    pub fn view(mut self, spec: ViewSpec) -> Self {
        self.views.push(spec);
        self
    }

    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.attributes.get(name).copied()
    }

    /// Declared views of `kind`, restricted to `attribute` when given.
    pub fn views_of(&self, kind: ViewKind, attribute: Option<&str>) -> Vec<&ViewSpec> {
        self.views
            .iter()
            .filter(|v| v.kind == kind)
            .filter(|v| attribute.is_none_or(|a| v.attribute == a))
            .collect()
    }

    /// Name of the counter document backing generated keys.
    pub fn sequence_name(&self) -> Option<String> {
        let options = self.primary_key.sequence.as_ref()?;
        Some(
            options
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_{}", self.table, self.primary_key.attribute)),
        )
    }

    /// Reject layouts that would make document ids ambiguous.
    pub fn check(&self) -> Result<(), DbError> {
        if self.table.is_empty() {
            return Err(DbError::Internal("table name must not be empty".into()));
        }
        if self.table.contains(keys::SEPARATOR) {
            return Err(DbError::Internal(format!(
                "table name {:?} contains the id separator {:?}",
                self.table,
                keys::SEPARATOR
            )));
        }
        if self.primary_key.attribute.starts_with('_') {
            return Err(DbError::Internal(format!(
                "primary key attribute {:?} is reserved",
                self.primary_key.attribute
            )));
        }
        Ok(())
    }
}

/// A persisted type.
pub trait Model: Serialize + DeserializeOwned + Send + Sync {
    fn schema() -> &'static ModelSchema;

    /// Checked before every create and update.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
