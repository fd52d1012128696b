mod common;
use common::*;

use serde_json::{Map, json};
use sofa_db::{DbError, KeyKind, KeyValue, SequenceOptions};
use sofa_store::DocumentStore;

// ── Identity ────────────────────────────────────────────────────

#[tokio::test]
async fn id_round_trips_through_the_store() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("42", "red", 3)).await.unwrap();

    let doc = adapter.store().get("widgets__42").await.unwrap();
    assert_eq!(doc["_id"], json!("widgets__42"));
    assert_eq!(doc["??table"], json!("widgets"));

    let back = repo.read("42").await.unwrap();
    assert_eq!(back.id, "42");
    assert_eq!(back, widget("42", "red", 3));
}

#[tokio::test]
async fn keys_containing_the_separator_survive() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("a__b", "red", 1)).await.unwrap();
    let found = repo.select().fetch().await.unwrap();
    assert_eq!(found[0].id, "a__b");
}

// ── Single records ──────────────────────────────────────────────

#[tokio::test]
async fn update_uses_the_tracked_revision() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("w1", "red", 1)).await.unwrap();
    let first = repo.revision(&"w1".into()).unwrap();

    let updated = repo.update(widget("w1", "green", 2)).await.unwrap();
    assert_eq!(updated.color, "green");
    let second = repo.revision(&"w1".into()).unwrap();
    assert_ne!(first, second);
    assert!(second.starts_with("2-"));

    assert_eq!(repo.read("w1").await.unwrap().price, 2);
}

#[tokio::test]
async fn update_without_revision_never_reaches_the_store() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    let before = adapter.store().calls();

    let err = repo.update(widget("never-read", "red", 1)).await.unwrap_err();
    assert_eq!(
        err,
        DbError::Internal("No revision number found for record with id never-read".into())
    );
    assert_eq!(adapter.store().calls(), before);
}

#[tokio::test]
async fn revision_tracking_is_bounded() {
    let adapter = sofa_db::Adapter::new(
        sofa_store::MemoryStore::new(),
        sofa_db::AdapterConfig {
            revision_capacity: 2,
            ..sofa_db::AdapterConfig::default()
        },
    );
    let repo = seed_widgets(&adapter).await;
    assert_eq!(adapter.revisions().len(), 2);
    assert!(repo.revision(&"w1".into()).is_none());
    assert!(repo.revision(&"w5".into()).is_some());

    // reading a record tracks its revision again
    let w1 = repo.read("w1").await.unwrap();
    assert_eq!(repo.update(w1).await.unwrap().id, "w1");
}

#[tokio::test]
async fn validation_runs_before_writes() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    let err = repo.create(widget("bad", "red", -1)).await.unwrap_err();
    assert!(matches!(err, DbError::Validation(m) if m.contains("bad")));
    assert_eq!(adapter.store().calls().insert, 0);
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("w1", "red", 1)).await.unwrap();
    let err = repo.create(widget("w1", "red", 1)).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

#[tokio::test]
async fn delete_then_read_is_not_found() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("w1", "red", 1)).await.unwrap();

    let removed = repo.delete("w1").await.unwrap();
    assert_eq!(removed.color, "red");
    assert!(repo.revision(&"w1".into()).is_none());

    let err = repo.read("w1").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound(m) if m.starts_with("widgets__w1")));
}

// ── Bulk ────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_length_mismatch_fails_before_any_store_call() {
    let adapter = adapter();
    let err = adapter
        .create_all("widgets", &[KeyValue::from("a"), KeyValue::from("b")], &[Map::new()])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DbError::Internal("Ids and models must have the same length".into())
    );
    assert_eq!(adapter.store().calls().bulk, 0);
}

#[tokio::test]
async fn bulk_round_trip() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    assert_eq!(adapter.store().calls().bulk, 1);

    let keys: Vec<KeyValue> = ["w1", "w3"].into_iter().map(KeyValue::from).collect();
    let read = repo.read_all(&keys).await.unwrap();
    assert_eq!(read.len(), 2);

    let bumped = read
        .into_iter()
        .map(|mut w| {
            w.price += 1;
            w
        })
        .collect();
    let updated = repo.update_all(bumped).await.unwrap();
    assert_eq!(updated[0].price, 11);
    assert_eq!(updated[1].price, 41);

    let deleted = repo.delete_all(&keys).await.unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(repo.read_all(&keys).await.is_err());
}

#[tokio::test]
async fn bulk_conflicts_are_reported_together() {
    let adapter = adapter();
    let repo = adapter.repository::<Widget>().unwrap();
    repo.create(widget("w2", "red", 1)).await.unwrap();
    repo.create(widget("w4", "red", 1)).await.unwrap();

    let err = repo
        .create_all(vec![
            widget("w1", "red", 1),
            widget("w2", "red", 1),
            widget("w3", "red", 1),
            widget("w4", "red", 1),
        ])
        .await
        .unwrap_err();
    let DbError::Batch(failures) = &err else {
        panic!("expected batch error, got {err:?}");
    };
    let indexes: Vec<_> = failures.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![1, 3]);
    assert!(err.to_string().starts_with("el 1: conflict"));
}

// ── Sequences ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_keys_come_from_the_sequence() {
    let adapter = adapter();
    let repo = adapter.repository::<Ticket>().unwrap();

    let first = repo.create(ticket("first")).await.unwrap();
    assert_eq!(first.id, Some(101));

    let batch = repo
        .create_all(vec![ticket("a"), ticket("b")])
        .await
        .unwrap();
    let ids: Vec<_> = batch.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![Some(102), Some(103)]);

    let explicit = repo
        .create(Ticket {
            id: Some(7),
            title: "manual".into(),
        })
        .await
        .unwrap();
    assert_eq!(explicit.id, Some(7));
    assert_eq!(repo.read(KeyValue::Number(102)).await.unwrap().title, "a");

    let doc = adapter.store().get("??sequence__tickets_id").await.unwrap();
    assert_eq!(doc["current"], json!(103));
}

#[tokio::test]
async fn sequence_current_and_next() {
    let adapter = adapter();
    let seq = adapter.sequence(
        "orders",
        KeyKind::BigInt,
        &SequenceOptions {
            name: None,
            start_with: 0,
            increment_by: 5,
        },
    );
    assert_eq!(seq.current().await.unwrap(), KeyValue::BigInt(0));
    assert_eq!(seq.next().await.unwrap(), KeyValue::BigInt(5));
    assert_eq!(seq.next().await.unwrap(), KeyValue::BigInt(10));
    assert_eq!(
        seq.range(2).await.unwrap(),
        vec![KeyValue::BigInt(15), KeyValue::BigInt(20)]
    );
    assert_eq!(seq.current().await.unwrap(), KeyValue::BigInt(20));

    let doc = adapter.store().get("??sequence__orders").await.unwrap();
    assert_eq!(doc["current"], json!("20"));
}

#[tokio::test]
async fn text_keys_cannot_be_generated() {
    let adapter = adapter();
    let seq = adapter.sequence("names", KeyKind::Text, &SequenceOptions::default());
    assert!(matches!(seq.next().await, Err(DbError::Internal(_))));
}
