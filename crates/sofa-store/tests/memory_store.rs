#![cfg(feature = "memory")]

use serde_json::{Value, json};
use sofa_query::{MangoQuery, Selector, Sort, SortDirection};
use sofa_store::{
    CreateIndexRequest, Document, DocumentStore, IndexDefinition, MemoryStore, ViewOptions,
    ViewResponse, ViewRow,
};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn selector(value: Value) -> Selector {
    serde_json::from_value(value).unwrap()
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    for (id, table, age) in [
        ("people__1", "people", 31),
        ("people__2", "people", 17),
        ("people__3", "people", 45),
        ("pets__1", "pets", 31),
    ] {
        store
            .insert(doc(json!({ "_id": id, "??table": table, "age": age })))
            .await
            .unwrap();
    }
    store
}

// ── Documents ───────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get() {
    let store = MemoryStore::new();
    let resp = store
        .insert(doc(json!({ "_id": "a", "v": 1 })))
        .await
        .unwrap();
    assert!(resp.rev.starts_with("1-"));

    let got = store.get("a").await.unwrap();
    assert_eq!(got["v"], json!(1));
    assert_eq!(got["_rev"], json!(resp.rev));
}

#[tokio::test]
async fn update_requires_current_rev() {
    let store = MemoryStore::new();
    let first = store.insert(doc(json!({ "_id": "a" }))).await.unwrap();

    let err = store.insert(doc(json!({ "_id": "a" }))).await.unwrap_err();
    assert_eq!(err.status(), Some(409));

    let second = store
        .insert(doc(json!({ "_id": "a", "_rev": first.rev })))
        .await
        .unwrap();
    assert!(second.rev.starts_with("2-"));

    let stale = store
        .insert(doc(json!({ "_id": "a", "_rev": first.rev })))
        .await
        .unwrap_err();
    assert_eq!(stale.status(), Some(409));
}

#[tokio::test]
async fn destroy_leaves_tombstone() {
    let store = MemoryStore::new();
    let w = store.insert(doc(json!({ "_id": "a" }))).await.unwrap();
    store.destroy("a", &w.rev).await.unwrap();

    let err = store.get("a").await.unwrap_err();
    assert_eq!(err.to_string(), "404 not_found: deleted");

    let missing = store.get("zzz").await.unwrap_err();
    assert_eq!(missing.to_string(), "404 not_found: missing");

    // a deleted id can be recreated without a revision
    store.insert(doc(json!({ "_id": "a" }))).await.unwrap();
}

#[tokio::test]
async fn bulk_reports_per_document_errors() {
    let store = MemoryStore::new();
    store.insert(doc(json!({ "_id": "taken" }))).await.unwrap();

    let results = store
        .bulk(vec![
            doc(json!({ "_id": "fresh" })),
            doc(json!({ "_id": "taken" })),
        ])
        .await
        .unwrap();

    assert!(!results[0].is_error());
    assert_eq!(results[1].error.as_deref(), Some("conflict"));
    assert_eq!(results[1].id.as_deref(), Some("taken"));
}

#[tokio::test]
async fn fetch_marks_missing_rows() {
    let store = seeded().await;
    let rows = store
        .fetch(&["people__1".to_string(), "nope".to_string()])
        .await
        .unwrap();
    assert!(rows[0].doc.is_some());
    assert_eq!(rows[1].error.as_deref(), Some("not_found"));
}

// ── Find ────────────────────────────────────────────────────────

#[tokio::test]
async fn find_filters_by_selector() {
    let store = seeded().await;
    let query = MangoQuery::new(selector(json!({
        "$and": [{ "??table": { "$eq": "people" } }, { "age": { "$gt": 20 } }]
    })));
    let resp = store.find(&query).await.unwrap();
    let ids: Vec<_> = resp.docs.iter().map(|d| d["_id"].clone()).collect();
    assert_eq!(ids, vec![json!("people__1"), json!("people__3")]);
}

#[tokio::test]
async fn sort_without_index_is_rejected() {
    let store = seeded().await;
    let mut query = MangoQuery::new(selector(json!({ "age": { "$gt": null } })));
    query.sort = vec![Sort::new("age", SortDirection::Desc)];

    let err = store.find(&query).await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    store
        .create_index(&CreateIndexRequest::new(
            "age_index",
            IndexDefinition {
                fields: vec![json!("age")],
                partial_filter_selector: None,
            },
        ))
        .await
        .unwrap();
    let resp = store.find(&query).await.unwrap();
    let ages: Vec<_> = resp.docs.iter().map(|d| d["age"].clone()).collect();
    assert_eq!(ages, vec![json!(45), json!(31), json!(31), json!(17)]);
}

#[tokio::test]
async fn bookmark_resumes_after_previous_page() {
    let store = seeded().await;
    let mut query = MangoQuery::new(Selector::eq("??table", "people"));
    query.limit = Some(2);

    let first = store.find(&query).await.unwrap();
    assert_eq!(first.docs.len(), 2);

    let second = store
        .find(&query.with_bookmark(first.bookmark.clone()))
        .await
        .unwrap();
    assert_eq!(second.docs.len(), 1);
    assert_eq!(second.docs[0]["_id"], json!("people__3"));
}

#[tokio::test]
async fn projection_keeps_requested_fields() {
    let store = seeded().await;
    let mut query = MangoQuery::new(Selector::eq("??table", "pets"));
    query.fields = Some(vec!["age".into()]);
    let resp = store.find(&query).await.unwrap();
    assert_eq!(Value::Object(resp.docs[0].clone()), json!({ "age": 31 }));
}

// ── Indexes and views ───────────────────────────────────────────

#[tokio::test]
async fn duplicate_index_reports_exists() {
    let store = MemoryStore::new();
    let req = CreateIndexRequest::new(
        "idx",
        IndexDefinition {
            fields: vec![json!({ "age": "asc" })],
            partial_filter_selector: None,
        },
    );
    assert_eq!(store.create_index(&req).await.unwrap().result, "created");
    assert_eq!(store.create_index(&req).await.unwrap().result, "exists");
    assert_eq!(store.index_names(), vec!["idx".to_string()]);
}

#[tokio::test]
async fn stubbed_views_answer_and_count_calls() {
    let store = MemoryStore::new();
    store.stub_view(
        "people__age__count__view__ddoc",
        "people__age__count__view",
        ViewResponse {
            rows: vec![ViewRow::new(Value::Null, json!(3))],
            ..ViewResponse::default()
        },
    );

    let resp = store
        .view(
            "people__age__count__view__ddoc",
            "people__age__count__view",
            &ViewOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(resp.rows[0].value, json!(3));

    let err = store
        .view("other", "missing", &ViewOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(store.calls().view, 2);
    assert_eq!(store.calls().find, 0);
}
