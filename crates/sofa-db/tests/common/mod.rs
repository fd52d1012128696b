#![allow(dead_code)]

use std::sync::LazyLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sofa_db::{
    Adapter, AdapterConfig, AttributeType, IndexSpec, KeyKind, Model, ModelSchema, PrimaryKey,
    Repository, SequenceOptions, ViewKind, ViewSpec,
};
use sofa_query::MangoQuery;
use sofa_store::{
    BulkResult, CreateIndexRequest, CreateIndexResponse, Document, DocumentStore, FetchRow,
    FindResponse, MemoryStore, StoreError, ViewOptions, ViewResponse, WriteResponse,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub color: String,
    pub price: i64,
}

static WIDGETS: LazyLock<ModelSchema> = LazyLock::new(|| {
    ModelSchema::new("widgets", PrimaryKey::new("id", KeyKind::Text))
        .attribute("color", AttributeType::Text)
        .attribute("price", AttributeType::Number)
        .index(IndexSpec::new("price"))
        .default_query("color")
        .view(ViewSpec::new(ViewKind::Count, "price"))
        .view(ViewSpec::new(ViewKind::Sum, "price"))
        .view(ViewSpec::new(ViewKind::Max, "price"))
        .view(ViewSpec::new(ViewKind::Distinct, "color"))
});

impl Model for Widget {
    fn schema() -> &'static ModelSchema {
        &WIDGETS
    }

    fn validate(&self) -> Result<(), String> {
        if self.price < 0 {
            return Err(format!("price of {} must not be negative", self.id));
        }
        Ok(())
    }
}

/// Shares the `color` attribute with [`Widget`] but lives in its own table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gadget {
    pub id: String,
    pub color: String,
}

static GADGETS: LazyLock<ModelSchema> = LazyLock::new(|| {
    ModelSchema::new("gadgets", PrimaryKey::new("id", KeyKind::Text))
        .attribute("color", AttributeType::Text)
});

impl Model for Gadget {
    fn schema() -> &'static ModelSchema {
        &GADGETS
    }
}

/// Numeric key drawn from a sequence when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
}

static TICKETS: LazyLock<ModelSchema> = LazyLock::new(|| {
    ModelSchema::new(
        "tickets",
        PrimaryKey::new("id", KeyKind::Number).generated(SequenceOptions {
            name: None,
            start_with: 100,
            increment_by: 1,
        }),
    )
    .attribute("title", AttributeType::Text)
});

impl Model for Ticket {
    fn schema() -> &'static ModelSchema {
        &TICKETS
    }
}

pub fn adapter() -> Adapter<MemoryStore> {
    Adapter::new(MemoryStore::new(), AdapterConfig::default())
}

pub fn widget(id: &str, color: &str, price: i64) -> Widget {
    Widget {
        id: id.to_string(),
        color: color.to_string(),
        price,
    }
}

pub fn ticket(title: &str) -> Ticket {
    Ticket {
        id: None,
        title: title.to_string(),
    }
}

/// Five widgets: three red, two blue.
pub async fn seed_widgets(adapter: &Adapter<MemoryStore>) -> Repository<Widget, MemoryStore> {
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create_all(vec![
        widget("w1", "red", 10),
        widget("w2", "blue", 25),
        widget("w3", "red", 40),
        widget("w4", "red", 5),
        widget("w5", "blue", 70),
    ])
    .await
    .unwrap();
    repo
}

/// A [`MemoryStore`] whose index creation always fails with `error`.
pub struct IndexFailures {
    pub inner: MemoryStore,
    pub error: StoreError,
}

impl IndexFailures {
    pub fn adapter(error: StoreError) -> Adapter<IndexFailures> {
        let store = IndexFailures {
            inner: MemoryStore::new(),
            error,
        };
        Adapter::new(store, AdapterConfig::default())
    }
}

#[async_trait]
impl DocumentStore for IndexFailures {
    async fn insert(&self, doc: Document) -> Result<WriteResponse, StoreError> {
        self.inner.insert(doc).await
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.inner.get(id).await
    }

    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResponse, StoreError> {
        self.inner.destroy(id, rev).await
    }

    async fn bulk(&self, docs: Vec<Document>) -> Result<Vec<BulkResult>, StoreError> {
        self.inner.bulk(docs).await
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError> {
        self.inner.fetch(ids).await
    }

    async fn find(&self, query: &MangoQuery) -> Result<FindResponse, StoreError> {
        self.inner.find(query).await
    }

    async fn create_index(
        &self,
        _request: &CreateIndexRequest,
    ) -> Result<CreateIndexResponse, StoreError> {
        Err(self.error.clone())
    }

    async fn view(
        &self,
        ddoc: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<ViewResponse, StoreError> {
        self.inner.view(ddoc, view, options).await
    }
}
