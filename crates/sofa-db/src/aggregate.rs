use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde_json::Value;
use sofa_query::MangoQuery;
use sofa_store::{Document, DocumentStore, ViewOptions, ViewResponse};
use tracing::debug;

use crate::error::DbError;
use crate::model::{AttributeType, ModelSchema, ViewKind, ViewSpec};
use crate::view::{design_doc_name, view_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    CountDistinct,
    Distinct,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::CountDistinct => "countDistinct",
            AggregateKind::Distinct => "distinct",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Avg => "avg",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub kind: AggregateKind,
    /// `None` only for a plain document count.
    pub attribute: Option<String>,
}

impl AggregateRequest {
    pub fn new(kind: AggregateKind, attribute: Option<&str>) -> Self {
        Self {
            kind,
            attribute: attribute.map(str::to_string),
        }
    }
}

/// One view query ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDescriptor {
    pub ddoc: String,
    pub view: String,
    pub options: ViewOptions,
    pub spec: ViewSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewTarget {
    Single(ViewDescriptor),
    /// Average is answered by dividing a sum view by a count view.
    Average {
        sum: ViewDescriptor,
        count: ViewDescriptor,
    },
}

/// An aggregate resolved against the model's declared views.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPlan {
    pub request: AggregateRequest,
    pub target: ViewTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutput {
    Count(u64),
    Number(f64),
    Value(Option<Value>),
    Values(Vec<Value>),
}

impl AggregateOutput {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            AggregateOutput::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AggregateOutput::Number(n) => Some(*n),
            AggregateOutput::Count(n) => Some(*n as f64),
            _ => None,
        }
    }
}

fn describe(schema: &ModelSchema, spec: &ViewSpec) -> ViewDescriptor {
    let reduce = spec.reduce.is_some() || !spec.return_docs;
    let grouped = reduce && matches!(spec.kind, ViewKind::Distinct | ViewKind::GroupBy);
    let name = view_name(&schema.table, spec);
    ViewDescriptor {
        ddoc: design_doc_name(&schema.table, spec),
        view: name,
        options: ViewOptions {
            reduce: Some(reduce),
            group: grouped.then_some(true),
            include_docs: (spec.return_docs && !reduce).then_some(true),
            ..ViewOptions::default()
        },
        spec: spec.clone(),
    }
}

fn missing_view(kind: &str, attribute: Option<&str>, table: &str) -> DbError {
    let on = attribute.map(|a| format!(" on \"{a}\"")).unwrap_or_default();
    DbError::Unsupported(format!(
        "a {kind} view must be declared for CouchDB {kind} aggregation{on} on table \"{table}\""
    ))
}

fn find_view(
    schema: &ModelSchema,
    kind: ViewKind,
    attribute: Option<&str>,
    requested: &str,
) -> Result<ViewDescriptor, DbError> {
    schema
        .views_of(kind, attribute)
        .first()
        .map(|spec| describe(schema, spec))
        .ok_or_else(|| missing_view(requested, attribute, &schema.table))
}

/// Pick the declared view(s) able to answer `request`. Fails without any
/// I/O when the model never declared one.
pub fn resolve(schema: &ModelSchema, request: &AggregateRequest) -> Result<ViewPlan, DbError> {
    let attr = request.attribute.as_deref();
    let single = |kind: ViewKind| {
        find_view(schema, kind, attr, kind.as_str()).map(ViewTarget::Single)
    };
    let target = match request.kind {
        AggregateKind::Count => single(ViewKind::Count)?,
        AggregateKind::CountDistinct | AggregateKind::Distinct => single(ViewKind::Distinct)?,
        AggregateKind::Sum => single(ViewKind::Sum)?,
        AggregateKind::Min => single(ViewKind::Min)?,
        AggregateKind::Max => single(ViewKind::Max)?,
        AggregateKind::Avg => {
            let attribute = attr.ok_or_else(|| missing_view("avg", None, &schema.table))?;
            ViewTarget::Average {
                sum: find_view(schema, ViewKind::Sum, Some(attribute), "avg")?,
                count: find_view(schema, ViewKind::Count, Some(attribute), "avg")?,
            }
        }
    };
    Ok(ViewPlan {
        request: request.clone(),
        target,
    })
}

/// One way of computing an aggregate.
#[async_trait]
pub trait AggregateStrategy: Send + Sync {
    async fn run(&self) -> Result<AggregateOutput, DbError>;
}

/// Answers from precomputed views.
pub struct ViewBacked<'a, S> {
    pub store: &'a S,
    pub plan: &'a ViewPlan,
}

async fn query_view<S: DocumentStore>(
    store: &S,
    d: &ViewDescriptor,
) -> Result<ViewResponse, DbError> {
    debug!(ddoc = %d.ddoc, view = %d.view, "querying view");
    Ok(store.view(&d.ddoc, &d.view, &d.options).await?)
}

#[async_trait]
impl<'a, S: DocumentStore> AggregateStrategy for ViewBacked<'a, S> {
    async fn run(&self) -> Result<AggregateOutput, DbError> {
        match &self.plan.target {
            ViewTarget::Single(d) => {
                let response = query_view(self.store, d).await?;
                Ok(view_output(self.plan.request.kind, &d.spec, response))
            }
            ViewTarget::Average { sum, count } => {
                let (sums, counts) =
                    futures::try_join!(query_view(self.store, sum), query_view(self.store, count))?;
                let total = first_value(&sums).and_then(Value::as_f64).unwrap_or(0.0);
                let n = first_value(&counts).and_then(Value::as_f64).unwrap_or(0.0);
                Ok(AggregateOutput::Number(if n == 0.0 { 0.0 } else { total / n }))
            }
        }
    }
}

fn first_value(response: &ViewResponse) -> Option<&Value> {
    response
        .rows
        .first()
        .map(|row| if row.value.is_null() { &row.key } else { &row.value })
}

fn view_output(kind: AggregateKind, spec: &ViewSpec, response: ViewResponse) -> AggregateOutput {
    let rows = response.rows;
    if kind == AggregateKind::CountDistinct {
        return AggregateOutput::Count(rows.len() as u64);
    }
    if kind == AggregateKind::Distinct {
        return AggregateOutput::Values(
            rows.into_iter()
                .map(|row| if row.key.is_null() { row.value } else { row.key })
                .collect(),
        );
    }
    if spec.return_docs {
        return AggregateOutput::Values(
            rows.into_iter()
                .map(|row| match (row.value, row.doc) {
                    (Value::Null, Some(doc)) => Value::Object(doc),
                    (value, _) => value,
                })
                .collect(),
        );
    }
    let first = rows
        .into_iter()
        .next()
        .map(|row| if row.value.is_null() { row.key } else { row.value });
    match kind {
        AggregateKind::Count => AggregateOutput::Count(
            first
                .as_ref()
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
                .unwrap_or(0),
        ),
        AggregateKind::Sum | AggregateKind::Avg => {
            AggregateOutput::Number(first.as_ref().and_then(Value::as_f64).unwrap_or(0.0))
        }
        _ => AggregateOutput::Value(first.filter(|v| !v.is_null())),
    }
}

/// Fetches every matching document and computes the aggregate locally.
pub struct ManualScan<'a, S> {
    pub store: &'a S,
    pub schema: &'a ModelSchema,
    pub query: &'a MangoQuery,
    pub request: &'a AggregateRequest,
    pub page_size: usize,
}

/// Page through all documents matching `query` with bookmarks. An explicit
/// query limit caps the total.
pub async fn scan_all<S: DocumentStore>(
    store: &S,
    query: &MangoQuery,
    page_size: usize,
) -> Result<Vec<Document>, DbError> {
    let page_size = page_size.max(1);
    let cap = query.limit;
    let mut docs = Vec::new();
    let mut page = query.clone();
    loop {
        let want = match cap {
            Some(cap) => page_size.min(cap.saturating_sub(docs.len())),
            None => page_size,
        };
        if want == 0 {
            break;
        }
        page.limit = Some(want);
        let response = store.find(&page).await?;
        let got = response.docs.len();
        docs.extend(response.docs);
        if got < want || response.bookmark.is_none() {
            break;
        }
        page.bookmark = response.bookmark;
        page.skip = None;
    }
    debug!(count = docs.len(), "scanned documents for aggregation");
    Ok(docs)
}

#[async_trait]
impl<'a, S: DocumentStore> AggregateStrategy for ManualScan<'a, S> {
    async fn run(&self) -> Result<AggregateOutput, DbError> {
        let docs = scan_all(self.store, self.query, self.page_size).await?;
        compute(self.schema, self.request, &docs)
    }
}

/// Client-side aggregate math shared by every manual path.
pub fn compute(
    schema: &ModelSchema,
    request: &AggregateRequest,
    docs: &[Document],
) -> Result<AggregateOutput, DbError> {
    let Some(attr) = request.attribute.as_deref() else {
        return Ok(match request.kind {
            AggregateKind::Count => AggregateOutput::Count(docs.len() as u64),
            AggregateKind::CountDistinct => {
                let seen: HashSet<String> = docs
                    .iter()
                    .map(|d| Value::Object(d.clone()).to_string())
                    .collect();
                AggregateOutput::Count(seen.len() as u64)
            }
            AggregateKind::Distinct => AggregateOutput::Values(Vec::new()),
            AggregateKind::Sum => AggregateOutput::Number(docs.len() as f64),
            AggregateKind::Avg => AggregateOutput::Number(0.0),
            AggregateKind::Min | AggregateKind::Max => AggregateOutput::Value(None),
        });
    };
    let ty = schema.attribute_type(attr);
    let present: Vec<&Value> = docs
        .iter()
        .filter_map(|d| d.get(attr))
        .filter(|v| !v.is_null())
        .collect();

    Ok(match request.kind {
        AggregateKind::Count => AggregateOutput::Count(present.len() as u64),
        AggregateKind::CountDistinct => {
            let seen: HashSet<String> = present.iter().map(|v| value_key(v, ty)).collect();
            AggregateOutput::Count(seen.len() as u64)
        }
        AggregateKind::Distinct => {
            let mut seen = HashSet::new();
            let values = docs
                .iter()
                .filter_map(|d| d.get(attr))
                .filter(|v| seen.insert(value_key(v, ty)))
                .cloned()
                .collect();
            AggregateOutput::Values(values)
        }
        AggregateKind::Sum => AggregateOutput::Number(sum(&present, attr, ty, "SUM")?),
        AggregateKind::Avg => {
            if present.is_empty() {
                AggregateOutput::Number(0.0)
            } else {
                let total = sum(&present, attr, ty, "AVG")?;
                AggregateOutput::Number(total / present.len() as f64)
            }
        }
        AggregateKind::Min => AggregateOutput::Value(extreme(&present, ty, |a, b| a < b)),
        AggregateKind::Max => AggregateOutput::Value(extreme(&present, ty, |a, b| a > b)),
    })
}

fn sum(values: &[&Value], attr: &str, ty: Option<AttributeType>, op: &str) -> Result<f64, DbError> {
    values.iter().try_fold(0.0, |acc, v| {
        numeric(v, ty).map(|n| acc + n).ok_or_else(|| {
            DbError::Query(format!(
                "{op} operation on \"{attr}\" requires numeric values, but got {}",
                type_name(v)
            ))
        })
    })
}

/// First value wins ties; values that cannot be compared are skipped.
fn extreme(values: &[&Value], ty: Option<AttributeType>, better: fn(f64, f64) -> bool) -> Option<Value> {
    let mut best: Option<(f64, &Value)> = None;
    for &v in values {
        let Some(n) = numeric(v, ty) else { continue };
        match best {
            Some((current, _)) if !better(n, current) => {}
            _ => best = Some((n, v)),
        }
    }
    best.map(|(_, v)| v.clone())
}

/// Numbers, numeric strings and (for date attributes) date strings as
/// epoch milliseconds.
pub fn numeric(value: &Value, ty: Option<AttributeType>) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if ty == Some(AttributeType::Date) => {
            date_millis(s).or_else(|| parse_number(s))
        }
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// `NaN` and infinities are not numbers for aggregation purposes.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn date_millis(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn number_key(n: &serde_json::Number) -> String {
    n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string())
}

fn iso_date(s: &str) -> Option<String> {
    let millis = date_millis(s)?;
    DateTime::from_timestamp_millis(millis as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Equality key for distinct values: `1` and `1.0` are the same number,
/// and date attributes compare by instant.
fn value_key(value: &Value, ty: Option<AttributeType>) -> String {
    match value {
        Value::Number(n) => number_key(n),
        Value::String(s) if ty == Some(AttributeType::Date) => match date_millis(s) {
            Some(millis) => format!("date:{millis}"),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// Group key used when partitioning documents by an attribute. Dates are
/// keyed by their UTC RFC 3339 form.
pub fn group_key(value: Option<&Value>, ty: Option<AttributeType>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) if ty == Some(AttributeType::Date) => {
            iso_date(s).unwrap_or_else(|| s.clone())
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => number_key(n),
        Some(other) => other.to_string(),
    }
}
