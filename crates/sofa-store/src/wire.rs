use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sofa_query::Selector;

/// A raw JSON document as stored, including `_id` and `_rev`.
pub type Document = Map<String, Value>;

/// Response to a single document write or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

/// One entry of a `_bulk_docs` response. Either `rev` or `error` is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One entry of a bulk fetch by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<Value>,
}

/// The `index` member of a `_index` request. Fields are either plain names
/// or `{name: direction}` objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub fields: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_filter_selector: Option<Selector>,
}

impl IndexDefinition {
    /// Field names without direction markers.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| match f {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.keys().next().map(String::as_str),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub index: IndexDefinition,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddoc: Option<String>,
    #[serde(rename = "type", default = "json_type")]
    pub kind: String,
}

fn json_type() -> String {
    "json".to_string()
}

impl CreateIndexRequest {
    pub fn new(name: impl Into<String>, index: IndexDefinition) -> Self {
        Self {
            index,
            name: name.into(),
            ddoc: None,
            kind: json_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexResponse {
    /// `"created"` or `"exists"`.
    pub result: String,
    pub id: String,
    pub name: String,
}

/// Query parameters for a view request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_docs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

impl ViewRow {
    pub fn new(key: Value, value: Value) -> Self {
        Self {
            id: None,
            key,
            value,
            doc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewResponse {
    pub rows: Vec<ViewRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}
