//! RPC surface of the datastore service
//!
//! Request and response types for the six service calls, and the
//! [`DatastoreRpc`] trait every backend implements. The client only ever
//! talks to the service through this trait; transports and test doubles
//! are interchangeable behind it.

use crate::entity::Entity;
use crate::key::Key;
use crate::mutation::{CommitResponse, Mutation};
use crate::query::{Consistency, Cursor, MoreResults, Query};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque transaction token issued by `begin_transaction`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(token: impl Into<String>) -> Self {
        TransactionId(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read options attached to lookups and queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub consistency: Option<Consistency>,
    pub transaction: Option<TransactionId>,
}

impl ReadOptions {
    /// Transactional reads are always strongly consistent
    pub fn validate(&self) -> Result<()> {
        if self.transaction.is_some() && self.consistency == Some(Consistency::Eventual) {
            return Err(Error::InvalidArgument(
                "eventual consistency cannot be used inside a transaction".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub project_id: String,
    pub read_options: ReadOptions,
    pub keys: Vec<Key>,
}

/// Keys the service did not resolve in this call come back as `deferred`
/// and must be looked up again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub found: Vec<Entity>,
    pub missing: Vec<Key>,
    pub deferred: Vec<Key>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub project_id: String,
    pub read_options: ReadOptions,
    pub query: Query,
}

/// Batch continuation state as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    /// The service stopped early; continue from the end cursor
    NotFinished,
    MoreResultsAfterLimit,
    MoreResultsAfterCursor,
    NoMoreResults,
}

impl BatchState {
    /// Caller-visible state, `None` while the batch is not finished
    pub fn more_results(&self) -> Option<MoreResults> {
        match self {
            BatchState::NotFinished => None,
            BatchState::MoreResultsAfterLimit => Some(MoreResults::MoreResultsAfterLimit),
            BatchState::MoreResultsAfterCursor => Some(MoreResults::MoreResultsAfterCursor),
            BatchState::NoMoreResults => Some(MoreResults::NoMoreResults),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    pub entities: Vec<Entity>,
    pub skipped_results: usize,
    pub end_cursor: Option<Cursor>,
    pub more_results: BatchState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
    pub read_only: bool,
}

impl TransactionOptions {
    pub fn read_only() -> Self {
        Self { read_only: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginTransactionRequest {
    pub project_id: String,
    pub options: TransactionOptions,
}

/// Begin-transaction response wire shape: `{ "transaction": "<token>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginTransactionResponse {
    pub transaction: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitMode {
    Transactional(TransactionId),
    NonTransactional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub project_id: String,
    pub mode: CommitMode,
    pub mutations: Vec<Mutation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub project_id: String,
    pub transaction: TransactionId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResponse {}

/// One incomplete key per id requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateIdsRequest {
    pub project_id: String,
    pub keys: Vec<Key>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateIdsResponse {
    pub keys: Vec<Key>,
}

/// The datastore service.
///
/// Every call is one round trip; errors are reported through the returned
/// `Result` and are never retried by callers of this trait.
#[async_trait]
pub trait DatastoreRpc: Send + Sync {
    async fn lookup(&self, request: LookupRequest) -> Result<LookupResponse>;

    async fn run_query(&self, request: RunQueryRequest) -> Result<RunQueryResponse>;

    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse>;

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse>;

    async fn rollback(&self, request: RollbackRequest) -> Result<RollbackResponse>;

    async fn allocate_ids(&self, request: AllocateIdsRequest) -> Result<AllocateIdsResponse>;
}
