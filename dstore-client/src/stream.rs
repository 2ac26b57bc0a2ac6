/// Batch-following readers for queries and lookups
///
/// The service may answer a query or lookup in several batches. `QueryPager`
/// follows unfinished query batches with the returned end cursor, and the
/// stream constructors expose both readers as lazy `BoxStream`s.

use dstore_core::{
    DatastoreRpc, Entity, Error, Key, LookupRequest, MoreResults, Query, QueryInfo, ReadOptions,
    Result, RunQueryRequest, RunQueryResponse,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Issues the RPCs for one logical query run
pub(crate) struct QueryPager {
    rpc: Arc<dyn DatastoreRpc>,
    project_id: String,
    read_options: ReadOptions,
    query: Query,
    max_api_calls: Option<usize>,
    calls: usize,
    info: Option<QueryInfo>,
}

impl QueryPager {
    pub(crate) fn new(
        rpc: Arc<dyn DatastoreRpc>,
        project_id: String,
        read_options: ReadOptions,
        query: Query,
        max_api_calls: Option<usize>,
    ) -> Self {
        Self {
            rpc,
            project_id,
            read_options,
            query,
            max_api_calls,
            calls: 0,
            info: None,
        }
    }

    /// Fetch the next batch, `None` once the run has finished
    pub(crate) async fn next_page(&mut self) -> Result<Option<Vec<Entity>>> {
        if self.info.is_some() {
            return Ok(None);
        }

        let request = RunQueryRequest {
            project_id: self.project_id.clone(),
            read_options: self.read_options.clone(),
            query: self.query.clone(),
        };
        let RunQueryResponse {
            entities,
            skipped_results,
            end_cursor,
            more_results,
        } = self.rpc.run_query(request).await?;
        self.calls += 1;

        debug!(
            kind = self.query.kind(),
            call = self.calls,
            returned = entities.len(),
            skipped = skipped_results,
            more_results = ?more_results,
            "Query batch received"
        );

        match more_results.more_results() {
            Some(more_results) => {
                self.info = Some(QueryInfo {
                    end_cursor,
                    more_results,
                });
            }
            None => {
                let cursor = end_cursor.ok_or_else(|| {
                    Error::Internal("unfinished query batch carried no end cursor".to_string())
                })?;
                let capped = self
                    .max_api_calls
                    .map_or(false, |max| self.calls >= max.max(1));
                if capped {
                    self.info = Some(QueryInfo {
                        end_cursor: Some(cursor),
                        more_results: MoreResults::MoreResultsAfterCursor,
                    });
                } else {
                    self.query = self.query.continue_from(cursor, skipped_results, entities.len());
                }
            }
        }

        Ok(Some(entities))
    }

    /// Continuation metadata, available once the run has finished
    pub(crate) fn info(&self) -> Option<&QueryInfo> {
        self.info.as_ref()
    }
}

/// Lazy stream over every entity of a query run
pub(crate) fn query_stream(pager: QueryPager) -> BoxStream<'static, Result<Entity>> {
    stream::unfold(Some(pager), |pager| async move {
        let mut pager = pager?;
        match pager.next_page().await {
            Ok(Some(entities)) => {
                let batch: Vec<Result<Entity>> = entities.into_iter().map(Ok).collect();
                Some((batch, Some(pager)))
            }
            Ok(None) => None,
            Err(e) => Some((vec![Err(e)], None)),
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

struct LookupState {
    rpc: Arc<dyn DatastoreRpc>,
    project_id: String,
    read_options: ReadOptions,
    pending: Vec<Key>,
}

/// Lazy stream over the entities found for `keys`; deferred keys are
/// requested again until none remain. Missing keys yield nothing.
pub(crate) fn lookup_stream(
    rpc: Arc<dyn DatastoreRpc>,
    project_id: String,
    read_options: ReadOptions,
    keys: Vec<Key>,
) -> BoxStream<'static, Result<Entity>> {
    let state = LookupState {
        rpc,
        project_id,
        read_options,
        pending: keys,
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if state.pending.is_empty() {
            return None;
        }
        let request = LookupRequest {
            project_id: state.project_id.clone(),
            read_options: state.read_options.clone(),
            keys: std::mem::take(&mut state.pending),
        };
        match state.rpc.lookup(request).await {
            Ok(response) => {
                debug!(
                    found = response.found.len(),
                    deferred = response.deferred.len(),
                    "Lookup batch received"
                );
                state.pending = response.deferred;
                let batch: Vec<Result<Entity>> = response.found.into_iter().map(Ok).collect();
                Some((batch, Some(state)))
            }
            Err(e) => Some((vec![Err(e)], None)),
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

/// Single-item stream carrying an error
pub(crate) fn error_stream(err: Error) -> BoxStream<'static, Result<Entity>> {
    stream::once(async move { Err(err) }).boxed()
}
