/// Streaming read tests
///
/// Query and lookup streams issue their RPCs lazily and follow unfinished
/// batches only as far as the consumer reads.

use dstore_client::{Error, Key, QueryExt, QueryOptions, Requests};
use dstore_emulator::EmulatorConfig;
use dstore_test_utils::{ids, TestDatastore};
use futures::{StreamExt, TryStreamExt};

#[tokio::test]
async fn test_stream_is_lazy() {
    let db = TestDatastore::with_config(EmulatorConfig::new().with_query_batch_size(5));
    db.seed("Item", 30).await;

    let stream = db
        .datastore
        .run_query_stream(&db.datastore.create_query("Item"), QueryOptions::default());
    assert_eq!(db.emulator.stats().queries, 0);

    let first: Vec<_> = stream.take(3).try_collect().await.unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3]);
    assert_eq!(db.emulator.stats().queries, 1);
}

#[tokio::test]
async fn test_stream_follows_all_batches() {
    let db = TestDatastore::with_config(EmulatorConfig::new().with_query_batch_size(4));
    db.seed("Item", 18).await;

    let all: Vec<_> = db
        .datastore
        .create_query("Item")
        .order_desc("index")
        .run_stream(&db.datastore, QueryOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids(&all), (1..=18).rev().collect::<Vec<i64>>());
    assert_eq!(db.emulator.stats().queries, 5);
}

#[tokio::test]
async fn test_stream_respects_max_api_calls() {
    let db = TestDatastore::with_config(EmulatorConfig::new().with_query_batch_size(3));
    db.seed("Item", 12).await;

    let options = QueryOptions::new().with_max_api_calls(2);
    let streamed: Vec<_> = db
        .datastore
        .run_query_stream(&db.datastore.create_query("Item"), options)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed.len(), 6);
    assert_eq!(db.emulator.stats().queries, 2);
}

#[tokio::test]
async fn test_stream_within_transaction() {
    let db = TestDatastore::new();
    db.seed("Item", 4).await;

    let mut tx = db.datastore.transaction();
    tx.run().await.unwrap();
    let entities: Vec<_> = tx
        .run_query_stream(&db.datastore.create_query("Item"), QueryOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entities.len(), 4);
    tx.rollback().await.unwrap();

    // A finished transaction cannot start a stream
    let mut stream = tx.run_query_stream(&db.datastore.create_query("Item"), QueryOptions::default());
    assert!(matches!(stream.next().await, Some(Err(Error::TransactionState(_)))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_read_stream_follows_deferred_keys() {
    let db = TestDatastore::with_config(EmulatorConfig::new().with_lookup_batch_size(3));
    let keys = db.seed("Item", 10).await;

    let found: Vec<_> = db
        .datastore
        .create_read_stream(keys, QueryOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids(&found), (1..=10).collect::<Vec<i64>>());
    assert_eq!(db.emulator.stats().lookups, 4);
}

#[tokio::test]
async fn test_read_stream_skips_missing_keys() {
    let db = TestDatastore::new();
    db.seed("Item", 2).await;

    let keys: Vec<Key> = [1, 5, 2, 9]
        .iter()
        .map(|&id| Key::with_id("Item", id).unwrap())
        .collect();
    let found: Vec<_> = db
        .datastore
        .create_read_stream(&keys, QueryOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![1, 2]);
}
