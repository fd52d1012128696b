use serde_json::{Value, json};
use sofa_query::{Condition, SortDirection, compile};
use sofa_store::{CreateIndexRequest, IndexDefinition};

use crate::error::DbError;
use crate::keys::{INDEX, SEPARATOR, TABLE};
use crate::model::ModelSchema;

const BOTH: [SortDirection; 2] = [SortDirection::Asc, SortDirection::Desc];

/// Collects index requests keyed by name, first definition wins.
#[derive(Default)]
struct IndexSet {
    requests: Vec<CreateIndexRequest>,
}

impl IndexSet {
    fn push(&mut self, request: CreateIndexRequest) {
        if !self.requests.iter().any(|r| r.name == request.name) {
            self.requests.push(request);
        }
    }
}

fn request(name: String, index: IndexDefinition) -> CreateIndexRequest {
    let mut req = CreateIndexRequest::new(name.clone(), index);
    req.ddoc = Some(name);
    req
}

/// Index over the table discriminator alone, shared by every model.
pub fn table_index() -> CreateIndexRequest {
    request(
        ["table", INDEX].join(SEPARATOR),
        IndexDefinition {
            fields: vec![Value::String(TABLE.to_string())],
            partial_filter_selector: None,
        },
    )
}

fn index_name(table: &str, attribute: &str, compositions: &[String], dir: Option<SortDirection>) -> String {
    let mut parts = vec![table, attribute];
    parts.extend(compositions.iter().map(String::as_str));
    if let Some(dir) = dir {
        parts.push(dir.as_str());
    }
    parts.push(INDEX);
    parts.join(SEPARATOR)
}

fn attribute_indexes(
    set: &mut IndexSet,
    table: &str,
    attribute: &str,
    compositions: &[String],
    directions: &[SortDirection],
) -> Result<(), DbError> {
    let plain_fields = std::iter::once(TABLE)
        .chain(std::iter::once(attribute))
        .chain(compositions.iter().map(String::as_str))
        .map(|f| Value::String(f.to_string()))
        .collect();
    let filter = compile(&Condition::attribute(TABLE).eq(table))?;
    set.push(request(
        index_name(table, attribute, compositions, None),
        IndexDefinition {
            fields: plain_fields,
            partial_filter_selector: Some(filter),
        },
    ));

    let directions = if directions.is_empty() { &BOTH[..] } else { directions };
    for &dir in directions {
        let fields = std::iter::once(TABLE)
            .chain(std::iter::once(attribute))
            .chain(compositions.iter().map(String::as_str))
            .map(|f| json!({ f: dir.as_str() }))
            .collect();
        set.push(request(
            index_name(table, attribute, compositions, Some(dir)),
            IndexDefinition {
                fields,
                partial_filter_selector: None,
            },
        ));
    }
    Ok(())
}

/// Every index the given models need: the shared table index, then per
/// model its declared indexes, default query attributes and view keys.
pub fn generate_indexes(schemas: &[&ModelSchema]) -> Result<Vec<CreateIndexRequest>, DbError> {
    let mut set = IndexSet::default();
    set.push(table_index());
    for schema in schemas {
        let table = schema.table.as_str();
        for spec in &schema.indexes {
            attribute_indexes(&mut set, table, &spec.attribute, &spec.compositions, &spec.directions)?;
        }
        for attribute in &schema.default_query_attributes {
            attribute_indexes(&mut set, table, attribute, &[], &[])?;
        }
    }
    for request in generate_view_indexes(schemas)? {
        set.push(request);
    }
    Ok(set.requests)
}

/// Indexes on each view's key, so the same attributes can also be sorted
/// through `_find`.
pub fn generate_view_indexes(schemas: &[&ModelSchema]) -> Result<Vec<CreateIndexRequest>, DbError> {
    let mut set = IndexSet::default();
    for schema in schemas {
        for view in &schema.views {
            let key = view.key_fields();
            let Some((attribute, compositions)) = key.split_first() else {
                continue;
            };
            attribute_indexes(&mut set, &schema.table, attribute, compositions, &view.directions)?;
        }
    }
    Ok(set.requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexSpec, KeyKind, PrimaryKey, ViewKind, ViewSpec};

    fn schema() -> ModelSchema {
        ModelSchema::new("widgets", PrimaryKey::new("id", KeyKind::Text))
            .index(IndexSpec::new("color").composed(&["size"]))
            .index(IndexSpec::new("weight").directed(&[SortDirection::Desc]))
            .default_query("name")
    }

    fn names(reqs: &[CreateIndexRequest]) -> Vec<&str> {
        reqs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn base_table_index_comes_first() {
        let s = schema();
        let reqs = generate_indexes(&[&s]).unwrap();
        assert_eq!(reqs[0].name, "table__index");
        assert_eq!(reqs[0].ddoc.as_deref(), Some("table__index"));
        assert_eq!(reqs[0].index.fields, vec![json!("??table")]);
    }

    #[test]
    fn plain_and_ordered_variants() {
        let s = schema();
        let reqs = generate_indexes(&[&s]).unwrap();
        assert_eq!(
            names(&reqs),
            vec![
                "table__index",
                "widgets__color__size__index",
                "widgets__color__size__asc__index",
                "widgets__color__size__desc__index",
                "widgets__weight__index",
                "widgets__weight__desc__index",
                "widgets__name__index",
                "widgets__name__asc__index",
                "widgets__name__desc__index",
            ]
        );

        let plain = &reqs[1];
        assert_eq!(
            plain.index.fields,
            vec![json!("??table"), json!("color"), json!("size")]
        );
        let filter = plain.index.partial_filter_selector.clone().unwrap();
        assert_eq!(filter.into_value(), json!({ "??table": { "$eq": "widgets" } }));

        let desc = &reqs[3];
        assert_eq!(
            desc.index.fields,
            vec![
                json!({ "??table": "desc" }),
                json!({ "color": "desc" }),
                json!({ "size": "desc" })
            ]
        );
        assert!(desc.index.partial_filter_selector.is_none());
    }

    #[test]
    fn duplicate_names_are_collapsed() {
        let s = ModelSchema::new("widgets", PrimaryKey::new("id", KeyKind::Text))
            .index(IndexSpec::new("name"))
            .default_query("name");
        let reqs = generate_indexes(&[&s]).unwrap();
        assert_eq!(reqs.len(), 4);
    }

    #[test]
    fn view_keys_get_indexes() {
        let s = ModelSchema::new("widgets", PrimaryKey::new("id", KeyKind::Text))
            .view(ViewSpec::new(ViewKind::GroupBy, "color").composed(&["size"]));
        let reqs = generate_view_indexes(&[&s]).unwrap();
        assert_eq!(
            names(&reqs),
            vec![
                "widgets__color__size__index",
                "widgets__color__size__asc__index",
                "widgets__color__size__desc__index",
            ]
        );
    }
}
