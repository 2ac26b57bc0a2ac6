/// dstore data model
///
/// Keys, property values, entities, queries, mutations and the RPC surface
/// shared by the client and the in-memory emulator.

pub mod error;
pub mod validation;
pub mod key;
pub mod value;
pub mod entity;
pub mod query;
pub mod mutation;
pub mod rpc;
pub mod config;

pub use config::{ClientConfig, Credentials, ResolvedConfig};
pub use entity::{Entity, IntoEntities, IntoEntity, IntoKeys};
pub use error::{Error, Result};
pub use key::{Key, KeyId, KeyOptions, PathElement, PathToken};
pub use mutation::{CommitResponse, Mutation, MutationResult, WriteMethod};
pub use query::{
    Consistency, Cursor, Direction, Filter, MoreResults, Operator, Order, OrderOptions, Query,
    QueryInfo, QueryOptions, QueryResult,
};
pub use rpc::*;
pub use validation::KEY_PROPERTY;
pub use value::{Coordinates, Double, GeoPoint, Int, Properties, Value};
