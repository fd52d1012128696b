use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sofa_store::Document;

use crate::error::DbError;
use crate::keys;
use crate::model::KeyValue;

/// Build the wire document for a record. `attributes` is left untouched.
pub fn to_document(
    table: &str,
    id: &str,
    attributes: &Map<String, Value>,
) -> Result<Document, DbError> {
    if let Some(reserved) = attributes.keys().find(|k| k.starts_with('_')) {
        return Err(DbError::Internal(format!(
            "attribute {reserved:?} on table {table:?} uses a reserved name"
        )));
    }
    let mut doc = Document::new();
    doc.insert(keys::ID.to_string(), Value::String(id.to_string()));
    doc.insert(keys::TABLE.to_string(), Value::String(table.to_string()));
    for (k, v) in attributes {
        if k != keys::TABLE {
            doc.insert(k.clone(), v.clone());
        }
    }
    Ok(doc)
}

pub fn model_to_attributes<M: Serialize>(model: &M) -> Result<Map<String, Value>, DbError> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(DbError::Internal(format!(
            "models must serialize to an object, got {other}"
        ))),
    }
}

pub fn strip_store_fields(mut doc: Document) -> Map<String, Value> {
    for field in [keys::ID, keys::REV, keys::DELETED, keys::TABLE] {
        doc.remove(field);
    }
    doc
}

/// Strip store fields from `doc` and put the decoded key back on `pk`.
pub fn strip(doc: Document, pk: &str, key: &KeyValue) -> Map<String, Value> {
    let mut attributes = strip_store_fields(doc);
    attributes.insert(pk.to_string(), key.to_json());
    attributes
}

pub fn revert<M: DeserializeOwned>(doc: Document, pk: &str, key: &KeyValue) -> Result<M, DbError> {
    Ok(serde_json::from_value(Value::Object(strip(doc, pk, key)))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        color: String,
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn document_carries_id_and_table() {
        let attrs = obj(json!({ "id": "42", "color": "red" }));
        let doc = to_document("widgets", "widgets__42", &attrs).unwrap();
        assert_eq!(doc["_id"], json!("widgets__42"));
        assert_eq!(doc["??table"], json!("widgets"));
        assert_eq!(doc["color"], json!("red"));
        assert!(!attrs.contains_key("_id"));
    }

    #[test]
    fn reserved_attributes_are_rejected() {
        let attrs = obj(json!({ "_rev": "1-x" }));
        assert!(to_document("widgets", "widgets__1", &attrs).is_err());
    }

    #[test]
    fn revert_restores_the_model() {
        let doc = obj(json!({
            "_id": "widgets__42",
            "_rev": "3-abc",
            "??table": "widgets",
            "color": "red",
        }));
        let w: Widget = revert(doc, "id", &KeyValue::Text("42".into())).unwrap();
        assert_eq!(
            w,
            Widget {
                id: "42".into(),
                color: "red".into()
            }
        );
    }

    #[test]
    fn non_object_models_fail() {
        assert!(model_to_attributes(&5).is_err());
    }
}
