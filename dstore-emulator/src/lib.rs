/// dstore emulator
///
/// An in-process datastore service for tests and local development. It keeps
/// entities in memory and implements the service's observable behavior:
/// write preconditions, optimistic transactions, query evaluation with
/// cursors, and batched lookups and queries.

pub mod config;
pub mod cursor;
pub mod query;
pub mod service;
pub mod store;
pub mod transaction;

pub use config::EmulatorConfig;
pub use service::{Emulator, EmulatorStats};
