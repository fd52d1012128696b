use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::{DDOC, DESIGN_PREFIX, SEPARATOR, TABLE, VIEW};
use crate::model::{ModelSchema, RoleMode, ViewAuth, ViewKind, ViewSpec, ViewValue};

const MAX_REDUCE: &str = "function (keys, values, rereduce) {
  var best = null;
  for (var i = 0; i < values.length; i++) {
    var val = values[i];
    if (rereduce && val && typeof val === 'object' && 'value' in val) val = val.value;
    if (best === null || val > best) best = val;
  }
  return best;
}";

const MIN_REDUCE: &str = "function (keys, values, rereduce) {
  var best = null;
  for (var i = 0; i < values.length; i++) {
    var val = values[i];
    if (rereduce && val && typeof val === 'object' && 'value' in val) val = val.value;
    if (best === null || val < best) best = val;
  }
  return best;
}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub language: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

impl DesignDocument {
    fn new(ddoc: &str) -> Self {
        Self {
            id: format!("{DESIGN_PREFIX}{ddoc}"),
            rev: None,
            language: "javascript".to_string(),
            views: BTreeMap::new(),
        }
    }

    /// Design document name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        self.id.strip_prefix(DESIGN_PREFIX).unwrap_or(&self.id)
    }
}

pub fn view_name(table: &str, spec: &ViewSpec) -> String {
    if let Some(name) = &spec.name {
        return name.clone();
    }
    [table, spec.attribute.as_str(), spec.kind.as_str(), VIEW]
        .join(SEPARATOR)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn design_doc_name(table: &str, spec: &ViewSpec) -> String {
    match &spec.ddoc {
        Some(ddoc) => ddoc.clone(),
        None => [table, &view_name(table, spec), DDOC].join(SEPARATOR),
    }
}

fn field(name: &str) -> String {
    format!("doc[{}]", Value::String(name.to_string()))
}

fn auth_guard(auth: &ViewAuth) -> Option<String> {
    match auth {
        ViewAuth::Expression(expr) => Some(expr.clone()),
        ViewAuth::Roles { roles, .. } if roles.is_empty() => None,
        ViewAuth::Roles { field: f, roles, mode } => {
            let joiner = match mode {
                RoleMode::Any => " || ",
                RoleMode::All => " && ",
            };
            let checks: Vec<_> = roles
                .iter()
                .map(|r| {
                    format!(
                        "({} || []).indexOf({}) !== -1",
                        field(f),
                        Value::String(r.clone())
                    )
                })
                .collect();
            Some(format!("({})", checks.join(joiner)))
        }
    }
}

fn emit_key(spec: &ViewSpec) -> String {
    let keys = spec.key_fields();
    match keys.as_slice() {
        [single] => field(single),
        many => format!(
            "[{}]",
            many.iter().map(|k| field(k)).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn emit_value(spec: &ViewSpec) -> String {
    match &spec.value {
        Some(ViewValue::Doc) => "doc".to_string(),
        Some(ViewValue::Fields(fields)) if fields.len() == 1 => field(&fields[0]),
        Some(ViewValue::Fields(fields)) => format!(
            "[{}]",
            fields.iter().map(|f| field(f)).collect::<Vec<_>>().join(", ")
        ),
        Some(ViewValue::Literal(v)) => v.to_string(),
        None if spec.return_docs && spec.kind != ViewKind::Sum => "doc".to_string(),
        None => field(&spec.attribute),
    }
}

pub fn map_function(table: &str, spec: &ViewSpec) -> String {
    if let Some(map) = &spec.map {
        return map.clone();
    }
    let mut guards = vec![format!("{} === {}", field(TABLE), Value::String(table.to_string()))];
    if let Some(condition) = &spec.condition {
        guards.push(condition.to_js("doc"));
    }
    if let (ViewKind::Count, Some(ViewValue::Literal(v))) = (spec.kind, &spec.value) {
        guards.push(format!("{} === {v}", field(&spec.attribute)));
    }
    if let Some(guard) = spec.auth.as_ref().and_then(auth_guard) {
        guards.push(guard);
    }
    format!(
        "function (doc) {{\n  if (!({})) return;\n  emit({}, {});\n}}",
        guards.join(" && "),
        emit_key(spec),
        emit_value(spec)
    )
}

pub fn default_reduce(kind: ViewKind) -> Option<&'static str> {
    match kind {
        ViewKind::Count | ViewKind::GroupBy | ViewKind::Distinct => Some("_count"),
        ViewKind::Sum => Some("_sum"),
        ViewKind::Max => Some(MAX_REDUCE),
        ViewKind::Min => Some(MIN_REDUCE),
        ViewKind::View => None,
    }
}

pub fn view_definition(table: &str, spec: &ViewSpec) -> ViewDefinition {
    ViewDefinition {
        map: map_function(table, spec),
        reduce: spec
            .reduce
            .clone()
            .or_else(|| default_reduce(spec.kind).map(str::to_string)),
    }
}

/// Design documents for every view the models declare, one per ddoc name.
pub fn generate_views(schemas: &[&ModelSchema]) -> Vec<DesignDocument> {
    let mut docs: BTreeMap<String, DesignDocument> = BTreeMap::new();
    for schema in schemas {
        for spec in &schema.views {
            let ddoc = design_doc_name(&schema.table, spec);
            docs.entry(ddoc.clone())
                .or_insert_with(|| DesignDocument::new(&ddoc))
                .views
                .insert(view_name(&schema.table, spec), view_definition(&schema.table, spec));
        }
    }
    docs.into_values().collect()
}
