mod common;

use std::{collections::BTreeSet, sync::Arc};

use bson::doc;
use futures::future::join_all;

use docsession::{
    backend::StoreBackend,
    database::Database,
    error::DocumentStoreError,
    memory::InMemoryStore,
    query::{Filter, Query, Update},
    sequence::COUNTERS_COLLECTION,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_have_no_gaps_or_duplicates() {
    const N: i32 = 64;
    let db = Arc::new(Database::new(InMemoryStore::new()));

    let tasks = (0..N).map(|_| {
        let db = Arc::clone(&db);
        tokio::spawn(async move { db.sequences().next("orders").await })
    });

    let values: Vec<i32> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("increment failed"))
        .collect();

    let unique: BTreeSet<i32> = values.iter().copied().collect();
    assert_eq!(unique.len(), values.len());
    assert_eq!(unique, (1..=N).collect());
}

#[tokio::test]
async fn names_are_independent() {
    let db = Database::new(InMemoryStore::new());
    let sequences = db.sequences();

    assert_eq!(sequences.next("a").await.unwrap(), 1);
    assert_eq!(sequences.next("a").await.unwrap(), 2);
    assert_eq!(sequences.next("b").await.unwrap(), 1);
    assert_eq!(sequences.next("a").await.unwrap(), 3);

    let counter = db
        .backend()
        .find_one(COUNTERS_COLLECTION, Query::filtered(Filter::eq("_id", "a")))
        .await
        .unwrap();
    assert_eq!(counter, Some(doc! { "_id": "a", "seq": 3 }));
}

#[tokio::test]
async fn custom_increments_go_through_find_and_auto_increment() {
    let db = Database::new(InMemoryStore::new());
    let counters = db.collection("tickets");

    let first = counters
        .find_and_auto_increment("desk", Filter::eq("_id", "desk"), Update::new().inc("seq", 10))
        .await
        .unwrap();
    let second = counters
        .find_and_auto_increment("desk", Filter::eq("_id", "desk"), Update::new().inc("seq", 10))
        .await
        .unwrap();

    assert_eq!((first, second), (10, 20));
}

#[tokio::test]
async fn non_numeric_counters_are_invalid_documents() {
    let db = Database::new(InMemoryStore::new());
    db.collection(COUNTERS_COLLECTION)
        .insert(&doc! { "_id": "broken", "seq": "x" })
        .await
        .unwrap();

    let result = db
        .collection(COUNTERS_COLLECTION)
        .find_and_auto_increment("broken", Filter::eq("_id", "broken"), Update::new().set("note", 1))
        .await;

    assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
}
