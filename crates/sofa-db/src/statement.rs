use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::{Map, Value, json};
use sofa_query::{
    Condition, Diagnostics, MangoQuery, Selector, Sort, SortDirection, Warning, compile, merge_into,
    tokens,
};
use sofa_store::{Document, DocumentStore};
use tracing::warn;

use crate::adapter::Adapter;
use crate::aggregate::{
    AggregateKind, AggregateOutput, AggregateRequest, AggregateStrategy, ManualScan, ViewBacked,
    ViewPlan, group_key, resolve,
};
use crate::error::DbError;
use crate::identity::{parse_id, parse_sequence_value};
use crate::keys::{ID, REV, TABLE};
use crate::model::{Model, ModelSchema};
use crate::paginator::Paginator;
use crate::repository::RevisionTable;
use crate::transcode::revert;

/// One stage of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    From(&'static ModelSchema),
    Select(Vec<String>),
    Where(Condition),
    GroupBy(String),
    Aggregate(AggregateRequest),
    OrderBy(String, SortDirection),
    Limit(usize),
    Offset(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct BuildContext {
    pub query_limit: usize,
}

/// What a built statement will do.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// A `_find` query. `manual` carries an aggregate that has to be
    /// computed over the matching documents.
    Find {
        query: MangoQuery,
        manual: Option<AggregateRequest>,
        group_by: Option<String>,
    },
    /// Answered entirely by declared views; no `_find` runs.
    View(ViewPlan),
}

fn push_clause(selector: &mut Selector, attribute: &str, clause: Value) {
    if let Some(Value::Array(members)) = selector.get_mut(tokens::AND) {
        members.push(json!({ attribute: clause }));
    } else {
        selector.insert(attribute, clause);
    }
}

/// Turn clauses into a plan. Pure: no I/O, warnings go to `diagnostics`.
pub fn build(
    clauses: &[Clause],
    ctx: &BuildContext,
    diagnostics: &mut Diagnostics,
) -> Result<Plan, DbError> {
    let mut target = None;
    let mut fields: Vec<String> = Vec::new();
    let mut filters: Vec<&Condition> = Vec::new();
    let mut group_by = None;
    let mut aggregate = None;
    let mut order = Vec::new();
    let mut limit = None;
    let mut offset = None;

    for clause in clauses {
        match clause {
            Clause::From(schema) => target = Some(*schema),
            Clause::Select(f) => fields.extend(f.iter().cloned()),
            Clause::Where(c) => filters.push(c),
            Clause::GroupBy(attr) => group_by = Some(attr.clone()),
            Clause::Aggregate(req) => aggregate = Some(req),
            Clause::OrderBy(attr, dir) => order.push(Sort::new(attr.clone(), *dir)),
            Clause::Limit(n) => limit = Some(*n),
            Clause::Offset(n) => offset = Some(*n),
        }
    }
    let schema =
        target.ok_or_else(|| DbError::Internal("No statement target defined".to_string()))?;

    let mut manual = None;
    if let Some(request) = aggregate {
        if !fields.is_empty() || group_by.is_some() {
            return Err(DbError::Query(format!(
                "{} aggregation cannot be combined with select or group by",
                request.kind
            )));
        }
        let plan = resolve(schema, request)?;
        if filters.is_empty() {
            return Ok(Plan::View(plan));
        }
        manual = Some(request.clone());
    }

    let table = schema.table.as_str();
    let mut selector = Selector::eq(TABLE, table);
    if let Some((first, rest)) = filters.split_first() {
        let condition = rest
            .iter()
            .fold((*first).clone(), |acc, c| acc.and((*c).clone()))
            .and(Condition::attribute(TABLE).eq(table));
        merge_into(&mut selector, compile(&condition)?, diagnostics);
    }

    for sort in &order {
        if !selector.constrains(&sort.field) {
            let mut bound = Map::new();
            bound.insert(tokens::BIGGER.to_string(), Value::Null);
            push_clause(&mut selector, &sort.field, Value::Object(bound));
        }
    }

    let limit = match limit {
        Some(n) => Some(n),
        None if manual.is_some() => None,
        None => {
            diagnostics.warn(Warning::DefaultLimitApplied {
                limit: ctx.query_limit,
            });
            Some(ctx.query_limit)
        }
    };

    Ok(Plan::Find {
        query: MangoQuery {
            selector,
            fields: (!fields.is_empty()).then_some(fields),
            sort: order,
            limit,
            skip: offset,
            bookmark: None,
        },
        manual,
        group_by,
    })
}

/// Query results: typed models, or raw documents when fields were
/// projected.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows<M> {
    Models(Vec<M>),
    Partial(Vec<Document>),
}

impl<M> Rows<M> {
    pub fn len(&self) -> usize {
        match self {
            Rows::Models(m) => m.len(),
            Rows::Partial(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_models(self) -> Option<Vec<M>> {
        match self {
            Rows::Models(m) => Some(m),
            Rows::Partial(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput<M> {
    Rows(Rows<M>),
    Groups(BTreeMap<String, Rows<M>>),
    Aggregate(AggregateOutput),
}

/// Rebuild models from full documents, remembering each revision.
pub(crate) fn decode_models<M: Model>(
    docs: Vec<Document>,
    revisions: &RevisionTable,
) -> Result<Vec<M>, DbError> {
    let schema = M::schema();
    let pk = &schema.primary_key;
    docs.into_iter()
        .map(|doc| {
            let id = doc
                .get(ID)
                .and_then(Value::as_str)
                .ok_or_else(|| DbError::Internal("document without an id".to_string()))?
                .to_string();
            let key = parse_sequence_value(pk.kind, parse_id(&schema.table, &id)?)?;
            if let Some(rev) = doc.get(REV).and_then(Value::as_str) {
                revisions.record(&id, rev);
            }
            revert(doc, &pk.attribute, &key)
        })
        .collect()
}

pub(crate) fn decode_rows<M: Model>(
    docs: Vec<Document>,
    projected: bool,
    revisions: &RevisionTable,
) -> Result<Rows<M>, DbError> {
    if projected {
        Ok(Rows::Partial(docs))
    } else {
        decode_models(docs, revisions).map(Rows::Models)
    }
}

/// A query over one model, built stage by stage and run on demand.
pub struct Statement<M, S> {
    adapter: Adapter<S>,
    clauses: Vec<Clause>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: DocumentStore> Statement<M, S> {
    pub(crate) fn new(adapter: Adapter<S>) -> Self {
        Self {
            adapter,
            clauses: vec![Clause::From(M::schema())],
            _model: PhantomData,
        }
    }

    fn push(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    fn aggregate_of(self, kind: AggregateKind, attribute: Option<&str>) -> Self {
        self.push(Clause::Aggregate(AggregateRequest::new(kind, attribute)))
    }

    pub fn select(self, fields: &[&str]) -> Self {
        self.push(Clause::Select(fields.iter().map(|f| f.to_string()).collect()))
    }

    /// Restrict results. Several filters are combined with AND.
    pub fn filter(self, condition: Condition) -> Self {
        self.push(Clause::Where(condition))
    }

    pub fn order_by(self, attribute: &str, direction: SortDirection) -> Self {
        self.push(Clause::OrderBy(attribute.to_string(), direction))
    }

    pub fn group_by(self, attribute: &str) -> Self {
        self.push(Clause::GroupBy(attribute.to_string()))
    }

    pub fn limit(self, n: usize) -> Self {
        self.push(Clause::Limit(n))
    }

    pub fn offset(self, n: usize) -> Self {
        self.push(Clause::Offset(n))
    }

    pub fn count(self) -> Self {
        self.aggregate_of(AggregateKind::Count, None)
    }

    pub fn count_of(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Count, Some(attribute))
    }

    pub fn count_distinct(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::CountDistinct, Some(attribute))
    }

    pub fn distinct(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Distinct, Some(attribute))
    }

    pub fn sum(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Sum, Some(attribute))
    }

    pub fn min(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Min, Some(attribute))
    }

    pub fn max(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Max, Some(attribute))
    }

    pub fn avg(self, attribute: &str) -> Self {
        self.aggregate_of(AggregateKind::Avg, Some(attribute))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn build(&self, diagnostics: &mut Diagnostics) -> Result<Plan, DbError> {
        let ctx = BuildContext {
            query_limit: self.adapter.config().query_limit,
        };
        build(&self.clauses, &ctx, diagnostics)
    }

    fn plan(&self) -> Result<Plan, DbError> {
        let mut diagnostics = Diagnostics::new();
        let plan = self.build(&mut diagnostics);
        for warning in diagnostics.drain() {
            warn!(table = %M::schema().table, "{warning}");
        }
        plan
    }

    pub async fn execute(&self) -> Result<QueryOutput<M>, DbError> {
        let store = self.adapter.store();
        match self.plan()? {
            Plan::View(plan) => {
                let strategy = ViewBacked {
                    store,
                    plan: &plan,
                };
                Ok(QueryOutput::Aggregate(strategy.run().await?))
            }
            Plan::Find {
                query,
                manual: Some(request),
                ..
            } => {
                let strategy = ManualScan {
                    store,
                    schema: M::schema(),
                    query: &query,
                    request: &request,
                    page_size: self.adapter.config().page_size,
                };
                Ok(QueryOutput::Aggregate(strategy.run().await?))
            }
            Plan::Find {
                query,
                manual: None,
                group_by,
            } => {
                let projected = query.fields.is_some();
                let docs = self.adapter.raw_docs(&query).await?;
                let revisions = self.adapter.revisions();
                let Some(attribute) = group_by else {
                    return Ok(QueryOutput::Rows(decode_rows(docs, projected, revisions)?));
                };
                let ty = M::schema().attribute_type(&attribute);
                let mut buckets: BTreeMap<String, Vec<Document>> = BTreeMap::new();
                for doc in docs {
                    buckets
                        .entry(group_key(doc.get(&attribute), ty))
                        .or_default()
                        .push(doc);
                }
                let groups = buckets
                    .into_iter()
                    .map(|(k, docs)| Ok((k, decode_rows(docs, projected, revisions)?)))
                    .collect::<Result<_, DbError>>()?;
                Ok(QueryOutput::Groups(groups))
            }
        }
    }

    /// Run a plain statement and return its models.
    pub async fn fetch(&self) -> Result<Vec<M>, DbError> {
        match self.execute().await? {
            QueryOutput::Rows(Rows::Models(models)) => Ok(models),
            QueryOutput::Rows(Rows::Partial(_)) => Err(DbError::Query(
                "statement selects a subset of fields; use execute() for partial rows".into(),
            )),
            _ => Err(DbError::Query(
                "statement aggregates or groups; use execute() or aggregate()".into(),
            )),
        }
    }

    pub async fn aggregate(&self) -> Result<AggregateOutput, DbError> {
        match self.execute().await? {
            QueryOutput::Aggregate(out) => Ok(out),
            _ => Err(DbError::Query("statement has no aggregate".into())),
        }
    }

    /// Run a hand-written query, decoding results as this statement's model.
    pub async fn raw(&self, query: &MangoQuery) -> Result<Rows<M>, DbError> {
        let docs = self.adapter.raw_docs(query).await?;
        decode_rows(docs, query.fields.is_some(), self.adapter.revisions())
    }

    /// Pages of `size` rows. An explicit [`Statement::limit`] caps the rows
    /// returned across all pages.
    pub fn paginate(&self, size: usize) -> Result<Paginator<M, S>, DbError> {
        if size == 0 {
            return Err(DbError::Paging("page size must be at least 1".into()));
        }
        let limit = self.clauses.iter().rev().find_map(|c| match c {
            Clause::Limit(n) => Some(*n),
            _ => None,
        });
        match self.plan()? {
            Plan::Find {
                query,
                manual: None,
                group_by: None,
            } => Ok(Paginator::new(self.adapter.clone(), query, size, limit)),
            _ => Err(DbError::Unsupported(
                "aggregate and grouped statements cannot be paginated".into(),
            )),
        }
    }
}
