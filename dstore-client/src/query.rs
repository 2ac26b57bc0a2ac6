/// Query execution entry points on the query value itself
use crate::request::Requests;
use async_trait::async_trait;
use dstore_core::{Entity, Query, QueryOptions, QueryResult, Result};
use futures::stream::BoxStream;

/// `query.run(&datastore)` style execution against a client or a transaction
#[async_trait]
pub trait QueryExt {
    async fn run<R>(&self, requests: &R) -> Result<QueryResult>
    where
        R: Requests;

    async fn run_with_options<R>(&self, requests: &R, options: QueryOptions) -> Result<QueryResult>
    where
        R: Requests;

    fn run_stream<R>(&self, requests: &R, options: QueryOptions) -> BoxStream<'static, Result<Entity>>
    where
        R: Requests;
}

#[async_trait]
impl QueryExt for Query {
    async fn run<R>(&self, requests: &R) -> Result<QueryResult>
    where
        R: Requests,
    {
        requests.run_query(self).await
    }

    async fn run_with_options<R>(&self, requests: &R, options: QueryOptions) -> Result<QueryResult>
    where
        R: Requests,
    {
        requests.run_query_with_options(self, options).await
    }

    fn run_stream<R>(&self, requests: &R, options: QueryOptions) -> BoxStream<'static, Result<Entity>>
    where
        R: Requests,
    {
        requests.run_query_stream(self, options)
    }
}
