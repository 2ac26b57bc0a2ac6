/// Completion-callback adapter
///
/// Every operation is an `async fn`. Callers that prefer a callback can hand
/// the future to `with_callback`, which drives it on the current tokio runtime
/// and calls the closure exactly once with the result. `CallbackExt` covers
/// the client's request surface; a transaction is not `Clone`, so its `run`,
/// `commit` and `rollback` go through `with_callback` with the transaction
/// moved into the future.

use crate::client::Datastore;
use crate::request::Requests;
use dstore_core::{
    CommitResponse, Entity, IntoEntities, IntoKeys, Key, Query, QueryResult, Result,
};
use std::future::Future;
use tokio::task::JoinHandle;

/// Spawn `future` and deliver its result to `callback`
pub fn with_callback<F, T, C>(future: F, callback: C) -> JoinHandle<()>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(Result<T>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(future.await);
    })
}

/// Callback forms of the client calls
pub trait CallbackExt {
    fn get_with_callback<C>(&self, key: Key, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<Option<Entity>>) + Send + 'static;

    fn get_many_with_callback<K, C>(&self, keys: K, callback: C) -> JoinHandle<()>
    where
        K: IntoKeys + Send + 'static,
        C: FnOnce(Result<Vec<Entity>>) + Send + 'static;

    fn save_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static;

    fn insert_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static;

    fn update_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static;

    fn upsert_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static;

    fn delete_with_callback<K, C>(&self, keys: K, callback: C) -> JoinHandle<()>
    where
        K: IntoKeys + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static;

    fn allocate_ids_with_callback<C>(&self, key: Key, n: usize, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<Vec<Key>>) + Send + 'static;

    fn run_query_with_callback<C>(&self, query: Query, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<QueryResult>) + Send + 'static;
}

impl CallbackExt for Datastore {
    fn get_with_callback<C>(&self, key: Key, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<Option<Entity>>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.get(&key).await }, callback)
    }

    fn get_many_with_callback<K, C>(&self, keys: K, callback: C) -> JoinHandle<()>
    where
        K: IntoKeys + Send + 'static,
        C: FnOnce(Result<Vec<Entity>>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.get_many(keys).await }, callback)
    }

    fn save_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.save(entities).await }, callback)
    }

    fn insert_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.insert(entities).await }, callback)
    }

    fn update_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.update(entities).await }, callback)
    }

    fn upsert_with_callback<E, C>(&self, entities: E, callback: C) -> JoinHandle<()>
    where
        E: IntoEntities + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.upsert(entities).await }, callback)
    }

    fn delete_with_callback<K, C>(&self, keys: K, callback: C) -> JoinHandle<()>
    where
        K: IntoKeys + Send + 'static,
        C: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.delete(keys).await }, callback)
    }

    fn allocate_ids_with_callback<C>(&self, key: Key, n: usize, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<Vec<Key>>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.allocate_ids(&key, n).await }, callback)
    }

    fn run_query_with_callback<C>(&self, query: Query, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<QueryResult>) + Send + 'static,
    {
        let datastore = self.clone();
        with_callback(async move { datastore.run_query(&query).await }, callback)
    }
}
