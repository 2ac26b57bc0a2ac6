/// Shared read and write operations
///
/// `Requests` is implemented by both the client and a transaction. The two
/// differ only in how reads are scoped (`read_options`) and in what happens
/// to mutations (`submit`): the client commits them at once, a transaction
/// buffers them until `commit`.

use crate::stream::{error_stream, lookup_stream, query_stream, QueryPager};
use async_trait::async_trait;
use dstore_core::{
    AllocateIdsRequest, DatastoreRpc, Entity, Error, IntoEntities, IntoKeys, Key, LookupRequest,
    Mutation, Query, QueryOptions, QueryResult, ReadOptions, Result, WriteMethod,
};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Requests: Send + Sync {
    /// What a write call returns: the commit response for immediate writes,
    /// nothing for buffered ones
    type Output: Send;

    fn rpc(&self) -> &Arc<dyn DatastoreRpc>;

    fn project_id(&self) -> &str;

    /// Read options for one read call
    fn read_options(&self, options: &QueryOptions) -> Result<ReadOptions>;

    /// Hand a batch of mutations over for commit
    async fn submit(&self, mutations: Vec<Mutation>) -> Result<Self::Output>;

    /// Get one entity
    async fn get(&self, key: &Key) -> Result<Option<Entity>> {
        self.get_with_options(key, QueryOptions::default()).await
    }

    async fn get_with_options(&self, key: &Key, options: QueryOptions) -> Result<Option<Entity>> {
        let mut found = self.get_many_with_options(key, options).await?;
        Ok(found.pop())
    }

    /// Get several entities. Missing keys are omitted from the result;
    /// found entities come back in request order.
    async fn get_many<K>(&self, keys: K) -> Result<Vec<Entity>>
    where
        K: IntoKeys + Send,
    {
        self.get_many_with_options(keys, QueryOptions::default()).await
    }

    async fn get_many_with_options<K>(&self, keys: K, options: QueryOptions) -> Result<Vec<Entity>>
    where
        K: IntoKeys + Send,
    {
        let keys = keys.into_keys();
        require_complete(&keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let read_options = self.read_options(&options)?;
        read_options.validate()?;

        let mut found: HashMap<Key, Entity> = HashMap::with_capacity(keys.len());
        let mut pending = keys.clone();
        let mut calls = 0usize;
        while !pending.is_empty() {
            let response = self
                .rpc()
                .lookup(LookupRequest {
                    project_id: self.project_id().to_string(),
                    read_options: read_options.clone(),
                    keys: pending,
                })
                .await?;
            calls += 1;
            for entity in response.found {
                found.insert(entity.key.clone(), entity);
            }
            pending = response.deferred;
        }

        let entities: Vec<Entity> = keys.iter().filter_map(|key| found.remove(key)).collect();
        debug!(
            requested = keys.len(),
            found = entities.len(),
            calls,
            "Get completed"
        );
        Ok(entities)
    }

    /// Save entities: upsert for complete keys, insert with an allocated id
    /// for incomplete ones
    async fn save<E>(&self, entities: E) -> Result<Self::Output>
    where
        E: IntoEntities + Send,
    {
        let entities = entities.into_entities()?;
        self.write(WriteMethod::Save, entities).await
    }

    /// Insert entities, failing if any already exists
    async fn insert<E>(&self, entities: E) -> Result<Self::Output>
    where
        E: IntoEntities + Send,
    {
        let entities = entities.into_entities()?;
        self.write(WriteMethod::Insert, entities).await
    }

    /// Update entities, failing if any does not exist
    async fn update<E>(&self, entities: E) -> Result<Self::Output>
    where
        E: IntoEntities + Send,
    {
        let entities = entities.into_entities()?;
        self.write(WriteMethod::Update, entities).await
    }

    /// Insert or overwrite entities
    async fn upsert<E>(&self, entities: E) -> Result<Self::Output>
    where
        E: IntoEntities + Send,
    {
        let entities = entities.into_entities()?;
        self.write(WriteMethod::Upsert, entities).await
    }

    /// Write entities with an explicit method as one batch
    async fn write(&self, method: WriteMethod, entities: Vec<Entity>) -> Result<Self::Output> {
        if method == WriteMethod::Update {
            require_complete(entities.iter().map(|e| &e.key))?;
        }
        let mutations = entities
            .into_iter()
            .map(|entity| Mutation::for_method(method, entity))
            .collect();
        self.submit(mutations).await
    }

    /// Delete entities by key; absent keys are not an error
    async fn delete<K>(&self, keys: K) -> Result<Self::Output>
    where
        K: IntoKeys + Send,
    {
        let keys = keys.into_keys();
        require_complete(&keys)?;
        let mutations = keys.into_iter().map(Mutation::Delete).collect();
        self.submit(mutations).await
    }

    /// Reserve `n` ids for an incomplete key without creating entities
    async fn allocate_ids(&self, key: &Key, n: usize) -> Result<Vec<Key>> {
        if key.is_complete() {
            return Err(Error::InvalidKey(format!(
                "allocate_ids needs an incomplete key, got {}",
                key
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .rpc()
            .allocate_ids(AllocateIdsRequest {
                project_id: self.project_id().to_string(),
                keys: vec![key.clone(); n],
            })
            .await?;
        debug!(kind = key.kind(), count = response.keys.len(), "Allocated ids");
        Ok(response.keys)
    }

    /// Run a query to completion (or to the `max_api_calls` cap)
    async fn run_query(&self, query: &Query) -> Result<QueryResult> {
        self.run_query_with_options(query, QueryOptions::default()).await
    }

    async fn run_query_with_options(
        &self,
        query: &Query,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let mut pager = query_pager(self, query, &options)?;
        let mut entities = Vec::new();
        while let Some(page) = pager.next_page().await? {
            entities.extend(page);
        }
        let info = pager
            .info()
            .cloned()
            .ok_or_else(|| Error::Internal("query finished without metadata".to_string()))?;
        Ok(QueryResult { entities, info })
    }

    /// Stream the entities of a query run. The stream owns its state and
    /// issues follow-up calls lazily; it cannot be restarted.
    fn run_query_stream(&self, query: &Query, options: QueryOptions) -> BoxStream<'static, Result<Entity>> {
        match query_pager(self, query, &options) {
            Ok(pager) => query_stream(pager),
            Err(e) => error_stream(e),
        }
    }

    /// Streaming form of `get_many`
    fn create_read_stream<K>(&self, keys: K, options: QueryOptions) -> BoxStream<'static, Result<Entity>>
    where
        K: IntoKeys,
    {
        let keys = keys.into_keys();
        if let Err(e) = require_complete(&keys) {
            return error_stream(e);
        }
        match self
            .read_options(&options)
            .and_then(|read_options| read_options.validate().map(|_| read_options))
        {
            Ok(read_options) => lookup_stream(
                Arc::clone(self.rpc()),
                self.project_id().to_string(),
                read_options,
                keys,
            ),
            Err(e) => error_stream(e),
        }
    }
}

fn query_pager<R: Requests + ?Sized>(
    requests: &R,
    query: &Query,
    options: &QueryOptions,
) -> Result<QueryPager> {
    query.validate()?;
    let read_options = requests.read_options(options)?;
    read_options.validate()?;
    Ok(QueryPager::new(
        Arc::clone(requests.rpc()),
        requests.project_id().to_string(),
        read_options,
        query.clone(),
        options.max_api_calls,
    ))
}

fn require_complete<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Result<()> {
    for key in keys {
        if key.is_incomplete() {
            return Err(Error::InvalidKey(format!("key {} is incomplete", key)));
        }
    }
    Ok(())
}
