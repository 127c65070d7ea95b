mod common;

use bson::{Bson, Document, doc};

use docsession::{
    adaptor::{DbAdaptor, DbAdaptorExt, StoreAdaptor},
    backend::StoreBackend,
    error::DocumentStoreError,
    memory::InMemoryStore,
    pipeline::{Accumulator, Group, Pipeline},
    query::{Filter, Projection, Sort, Update},
};

use common::{FailingStore, Person, people};

async fn facade() -> StoreAdaptor<InMemoryStore> {
    StoreAdaptor::new(people().await)
}

fn names(rows: &[Document]) -> Vec<&str> {
    rows.iter().filter_map(|row| row.get_str("name").ok()).collect()
}

#[tokio::test]
async fn invalid_windows_never_reach_the_store() {
    let store = FailingStore::default();
    let db = StoreAdaptor::new(&store);
    let mut rows: Vec<Document> = Vec::new();

    for limit in [0, -3] {
        assert!(matches!(
            db.find("people", None, &mut rows, limit).await,
            Err(DocumentStoreError::InvalidArgument(_))
        ));
    }
    for (limit, skip) in [(0, 0), (5, -1), (-1, 2)] {
        assert!(matches!(
            db.find_by_limit_and_skip("people", None, &mut rows, limit, skip).await,
            Err(DocumentStoreError::InvalidArgument(_))
        ));
    }
    assert!(matches!(
        db.find_with_multiple("people", None, Projection::new(), Vec::new(), &mut rows, -1, 0).await,
        Err(DocumentStoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.find_sort_by_limit_and_skip("people", None, vec![Sort::asc("age")], &mut rows, 2, -2).await,
        Err(DocumentStoreError::InvalidArgument(_))
    ));

    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn find_one_reports_whether_a_document_matched() {
    let db = facade().await;

    let mut found: Option<Person> = None;
    assert!(db.find_one("people", Some(Filter::eq("name", "bob")), &mut found).await.unwrap());
    assert_eq!(found, Some(Person { name: "bob".into(), age: 25 }));

    let mut missing: Option<Person> = None;
    assert!(!db.find_one("people", Some(Filter::eq("name", "zed")), &mut missing).await.unwrap());
    assert_eq!(missing, None);
}

#[tokio::test]
async fn find_limits_and_pages() {
    let db = facade().await;
    let mut rows: Vec<Document> = Vec::new();

    db.find("people", None, &mut rows, 2).await.unwrap();
    assert_eq!(names(&rows), ["ann", "bob"]);

    db.find_by_limit_and_skip("people", None, &mut rows, 2, 2).await.unwrap();
    assert_eq!(names(&rows), ["cid"]);

    db.find_all("people", Some(Filter::eq("team", "red")), &mut rows).await.unwrap();
    assert_eq!(names(&rows), ["ann", "cid"]);
}

#[tokio::test]
async fn find_with_select_switches_to_a_single_read() {
    let db = facade().await;

    let mut one: Option<Document> = None;
    db.find_with_select("people", None, Projection::new().include("name").exclude_id(), &mut one, 1)
        .await
        .unwrap();
    assert_eq!(one, Some(doc! { "name": "ann" }));

    let mut many: Vec<Document> = Vec::new();
    db.find_with_select("people", None, Projection::including(["age"]), &mut many, 2)
        .await
        .unwrap();
    assert_eq!(many, vec![doc! { "_id": 1, "age": 31 }, doc! { "_id": 2, "age": 25 }]);

    db.find_select("people", Some(Filter::gt("age", 30)), Projection::new().exclude("team"), &mut many)
        .await
        .unwrap();
    assert_eq!(
        many,
        vec![doc! { "_id": 1, "name": "ann", "age": 31 }, doc! { "_id": 3, "name": "cid", "age": 40 }]
    );
}

#[tokio::test]
async fn find_with_multiple_combines_every_option() {
    let db = facade().await;
    let selection = Projection::new().include("name").exclude_id();

    let mut rows: Vec<Document> = Vec::new();
    db.find_with_multiple("people", None, selection.clone(), vec![Sort::desc("age")], &mut rows, 2, 1)
        .await
        .unwrap();
    assert_eq!(rows, vec![doc! { "name": "ann" }, doc! { "name": "bob" }]);

    db.find_with_multiple("people", None, selection.clone(), vec![Sort::asc("age")], &mut rows, 0, 1)
        .await
        .unwrap();
    assert_eq!(names(&rows), ["ann", "cid"]);

    let mut youngest: Option<Document> = None;
    db.find_with_multiple("people", None, selection, vec![Sort::asc("age")], &mut youngest, 1, 2)
        .await
        .unwrap();
    assert_eq!(youngest, Some(doc! { "name": "bob" }));
}

#[tokio::test]
async fn sorted_pages_with_zero_limit_return_everything() {
    let db = facade().await;
    let mut rows: Vec<Document> = Vec::new();

    db.find_sort_by_limit_and_skip("people", None, vec![Sort::desc("age")], &mut rows, 0, 2)
        .await
        .unwrap();
    assert_eq!(names(&rows), ["cid", "ann", "bob"]);

    db.find_sort_by_limit_and_skip(
        "people",
        None,
        vec![Sort::asc("team"), Sort::desc("age")],
        &mut rows,
        2,
        1,
    )
    .await
    .unwrap();
    assert_eq!(names(&rows), ["cid", "ann"]);
}

#[tokio::test]
async fn count_distinct_and_aggregation() {
    let db = facade().await;

    assert_eq!(db.find_count("people", None).await.unwrap(), 3);
    assert_eq!(db.find_count("people", Some(Filter::eq("team", "red"))).await.unwrap(), 2);

    let teams = db.find_with_distinct("people", "team", None).await.unwrap();
    assert_eq!(teams, vec![Bson::from("red"), Bson::from("blue")]);

    let mut totals: Vec<Document> = Vec::new();
    db.find_with_aggregation(
        "people",
        Pipeline::new()
            .group(Group::all().accumulate("age", Accumulator::Sum("age".into())))
            .project(Projection::new().include("age").exclude_id()),
        &mut totals,
    )
    .await
    .unwrap();
    assert_eq!(totals, vec![doc! { "age": 96 }]);
}

#[tokio::test]
async fn empty_selectors_update_and_remove_everything() {
    let db = facade().await;

    let outcome = db.update("people", None, doc! { "active": false }, true).await.unwrap();
    assert_eq!((outcome.matched, outcome.modified), (3, 3));
    assert_eq!(db.find_count("people", Some(Filter::eq("active", false))).await.unwrap(), 3);

    let outcome = db
        .update_raw("people", Some(Filter::all()), Update::new().inc("age", 1), true)
        .await
        .unwrap();
    assert_eq!(outcome.modified, 3);

    assert_eq!(db.remove("people", None, true).await.unwrap(), 3);
    assert_eq!(db.find_count("people", None).await.unwrap(), 0);
}

#[tokio::test]
async fn single_writes_touch_the_first_match() {
    let db = facade().await;

    let outcome = db
        .update("people", Some(Filter::eq("team", "red")), doc! { "lead": true }, false)
        .await
        .unwrap();
    assert_eq!(outcome.modified, 1);
    assert_eq!(db.find_count("people", Some(Filter::exists("lead"))).await.unwrap(), 1);

    db.update_by_id("people", Bson::Int32(2), doc! { "age": 26 }).await.unwrap();
    let bob: Option<Person> = db.find_one_as("people", Some(Filter::eq("_id", 2))).await.unwrap();
    assert_eq!(bob.map(|p| p.age), Some(26));

    assert_eq!(db.remove("people", Some(Filter::eq("team", "red")), false).await.unwrap(), 1);
    assert_eq!(db.remove_by_id("people", Bson::Int32(3)).await.unwrap(), 1);
    assert_eq!(db.find_count("people", None).await.unwrap(), 1);
}

#[tokio::test]
async fn plain_update_never_upserts_but_raw_update_does() {
    let db = facade().await;

    let outcome = db
        .update("people", Some(Filter::eq("name", "eve")), doc! { "age": 20 }, false)
        .await
        .unwrap();
    assert_eq!(outcome.matched, 0);
    assert!(outcome.upserted_id.is_none());

    let outcome = db
        .update_raw("people", Some(Filter::eq("name", "eve")), Update::new().set("age", 20), false)
        .await
        .unwrap();
    assert!(outcome.upserted_id.is_some());

    let eve: Vec<Person> = db.find_all_as("people", Some(Filter::eq("name", "eve"))).await.unwrap();
    assert_eq!(eve, vec![Person { name: "eve".into(), age: 20 }]);
}

#[tokio::test]
async fn inserts_return_ids_in_order() {
    let db = StoreAdaptor::new(InMemoryStore::new());

    let id = db.insert("people", doc! { "_id": "a", "name": "ann", "age": 1 }).await.unwrap();
    assert_eq!(id, Bson::from("a"));

    let ids = db
        .insert_all(
            "people",
            vec![doc! { "_id": "b", "name": "bob", "age": 2 }, doc! { "_id": "c", "name": "cid", "age": 3 }],
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![Bson::from("b"), Bson::from("c")]);

    let generated = db.insert_as("people", &Person { name: "dan".into(), age: 4 }).await.unwrap();
    assert!(matches!(generated, Bson::ObjectId(_)));

    let everyone: Vec<Person> = db.find_as("people", None, 10).await.unwrap();
    assert_eq!(everyone.len(), 4);
}

#[tokio::test]
async fn sequences_start_at_one() {
    let db = StoreAdaptor::new(InMemoryStore::new());

    assert_eq!(db.get_next_sequence("orders").await.unwrap(), 1);
    assert_eq!(db.get_next_sequence("orders").await.unwrap(), 2);
    assert_eq!(db.get_next_sequence("invoices").await.unwrap(), 1);
}

#[tokio::test]
async fn lifecycle_goes_through_the_facade() {
    let store = InMemoryStore::new();
    let db = StoreAdaptor::new(store.clone());

    db.set_pool_limit(32).await.unwrap();
    assert_eq!(store.pool_limit(), 32);
    assert!(matches!(
        db.set_pool_limit(u64::from(u32::MAX) + 1).await,
        Err(DocumentStoreError::InvalidArgument(_))
    ));

    db.ping().await.unwrap();
    db.disconnect().await.unwrap();
    assert!(!store.is_connected());
    assert!(matches!(db.find_count("people", None).await, Err(DocumentStoreError::NotConnected)));

    db.connect("memory://", "app").await.unwrap();
    assert!(store.is_connected());
    assert_eq!(store.count("people", None).await.unwrap(), 0);
}

#[tokio::test]
async fn facade_works_as_a_trait_object() {
    let db: Box<dyn DbAdaptor> = Box::new(facade().await);

    let mut rows: Vec<Person> = Vec::new();
    db.find("people", Some(Filter::lt("age", 30)), &mut rows, 5).await.unwrap();

    assert_eq!(rows, vec![Person { name: "bob".into(), age: 25 }]);
}
