/// dstore client library
///
/// This crate provides a typed client for cloud-datastore style services:
/// keys, queries, transactions, and get/save/delete requests over any
/// [`DatastoreRpc`] backend.

pub mod callback;
pub mod client;
pub mod query;
pub mod request;
mod stream;
pub mod transaction;

// Re-export key types
pub use callback::{with_callback, CallbackExt};
pub use client::Datastore;
pub use query::QueryExt;
pub use request::Requests;
pub use transaction::{Transaction, TransactionState};

pub use dstore_core::{
    path, ClientConfig, CommitResponse, Consistency, Coordinates, Credentials, Cursor,
    DatastoreRpc, Direction, Double, Entity, Error, GeoPoint, Int, IntoEntities, IntoEntity,
    IntoKeys, Key, KeyOptions, MoreResults, MutationResult, Operator, OrderOptions, PathToken,
    Query, QueryInfo, QueryOptions, QueryResult, Result, TransactionOptions, Value, WriteMethod,
    KEY_PROPERTY,
};
