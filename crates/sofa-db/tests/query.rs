mod common;
use common::*;

use serde_json::json;
use sofa_db::{Condition, DbError, Diagnostics, MangoQuery, Plan, QueryOutput, Rows, SortDirection, Warning};
use sofa_query::Selector;

fn ids(widgets: &[Widget]) -> Vec<&str> {
    widgets.iter().map(|w| w.id.as_str()).collect()
}

// ── Filtering ───────────────────────────────────────────────────

#[tokio::test]
async fn tables_do_not_leak_into_each_other() {
    let adapter = adapter();
    seed_widgets(&adapter).await;
    let gadgets = adapter.repository::<Gadget>().unwrap();
    gadgets
        .create(Gadget {
            id: "g1".into(),
            color: "red".into(),
        })
        .await
        .unwrap();

    let red = Condition::attribute("color").eq("red");
    let found = adapter
        .statement::<Gadget>()
        .filter(red.clone())
        .fetch()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "g1");

    let widgets = adapter.statement::<Widget>().filter(red).fetch().await.unwrap();
    assert_eq!(ids(&widgets), vec!["w1", "w3", "w4"]);
}

#[tokio::test]
async fn filters_combine_with_and() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;

    let found = repo
        .select()
        .filter(Condition::attribute("price").gt(20))
        .filter(Condition::attribute("color").eq("blue"))
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["w2", "w5"]);

    let either = repo
        .select()
        .filter(
            Condition::attribute("price")
                .lt(8)
                .or(Condition::attribute("price").gte(70)),
        )
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&either), vec!["w4", "w5"]);
}

#[tokio::test]
async fn between_and_in_list() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;

    let mid = repo
        .select()
        .filter(Condition::attribute("price").between(10, 40))
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&mid), vec!["w1", "w2", "w3"]);

    let picked = repo
        .select()
        .filter(Condition::attribute("id").in_list(["w2", "w4"]))
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&picked), vec!["w2", "w4"]);
}

// ── Ordering and limits ─────────────────────────────────────────

#[tokio::test]
async fn sorting_without_an_index_is_an_index_error() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    let err = repo
        .select()
        .order_by("price", SortDirection::Desc)
        .fetch()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Index(_)), "{err:?}");
}

#[tokio::test]
async fn order_limit_and_offset_after_initialize() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    adapter.initialize().await.unwrap();

    let sorted = repo
        .select()
        .order_by("price", SortDirection::Desc)
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&sorted), vec!["w5", "w3", "w2", "w1", "w4"]);

    let window = repo
        .select()
        .order_by("price", SortDirection::Asc)
        .offset(1)
        .limit(2)
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&window), vec!["w1", "w2"]);
}

#[test]
fn missing_limit_falls_back_to_the_configured_default() {
    let adapter = adapter();
    let statement = adapter
        .statement::<Widget>()
        .order_by("price", SortDirection::Asc);
    let mut diagnostics = Diagnostics::new();
    let Plan::Find { query, .. } = statement.build(&mut diagnostics).unwrap() else {
        panic!("expected a find plan");
    };
    assert_eq!(query.limit, Some(250));
    assert_eq!(query.selector.get("price"), Some(&json!({ "$gt": null })));
    assert!(
        diagnostics
            .warnings()
            .contains(&Warning::DefaultLimitApplied { limit: 250 })
    );
}

// ── Projection and grouping ─────────────────────────────────────

#[tokio::test]
async fn projected_statements_return_partial_rows() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    let statement = repo
        .select()
        .select(&["color"])
        .filter(Condition::attribute("price").lte(10));

    let QueryOutput::Rows(Rows::Partial(docs)) = statement.execute().await.unwrap() else {
        panic!("expected partial rows");
    };
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.len() == 1 && d["color"] == json!("red")));

    assert!(matches!(statement.fetch().await, Err(DbError::Query(_))));
}

#[tokio::test]
async fn group_by_partitions_rows() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    let QueryOutput::Groups(groups) = repo.select().group_by("color").execute().await.unwrap()
    else {
        panic!("expected groups");
    };
    let sizes: Vec<_> = groups.iter().map(|(k, rows)| (k.as_str(), rows.len())).collect();
    assert_eq!(sizes, vec![("blue", 2), ("red", 3)]);

    let blue = groups["blue"].clone().into_models().unwrap();
    assert_eq!(ids(&blue), vec!["w2", "w5"]);
}

// ── Raw queries ─────────────────────────────────────────────────

#[tokio::test]
async fn raw_queries_decode_as_models() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;

    let mut query = MangoQuery::new(Selector::eq("??table", "widgets"));
    query.limit = Some(3);
    let rows = repo.select().raw(&query).await.unwrap();
    assert_eq!(rows.len(), 3);
    let models = rows.into_models().unwrap();
    assert_eq!(models[0], widget("w1", "red", 10));
}

#[tokio::test]
async fn queried_records_can_be_updated() {
    let adapter = adapter();
    let repo = seed_widgets(&adapter).await;
    adapter.revisions().forget("widgets__w2");

    let found = repo
        .select()
        .filter(Condition::attribute("id").eq("w2"))
        .fetch()
        .await
        .unwrap();
    let mut w2 = found.into_iter().next().unwrap();
    w2.price = 26;
    assert_eq!(repo.update(w2).await.unwrap().price, 26);
}
