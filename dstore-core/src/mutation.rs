/// Mutations and commit results

use crate::entity::Entity;
use crate::key::Key;
use serde::{Deserialize, Serialize};

/// Write method used when turning entities into mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMethod {
    /// Upsert for complete keys, insert for incomplete ones
    Save,
    /// Fails if the entity exists
    Insert,
    /// Fails if the entity does not exist
    Update,
    /// Always succeeds
    Upsert,
}

impl WriteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMethod::Save => "save",
            WriteMethod::Insert => "insert",
            WriteMethod::Update => "update",
            WriteMethod::Upsert => "upsert",
        }
    }
}

/// A single mutation applied at commit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    Insert(Entity),
    Update(Entity),
    Upsert(Entity),
    Delete(Key),
}

impl Mutation {
    /// Mutation for one entity under a write method
    pub fn for_method(method: WriteMethod, entity: Entity) -> Self {
        match method {
            WriteMethod::Save if entity.key.is_incomplete() => Mutation::Insert(entity),
            WriteMethod::Save | WriteMethod::Upsert => Mutation::Upsert(entity),
            WriteMethod::Insert => Mutation::Insert(entity),
            WriteMethod::Update => Mutation::Update(entity),
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Mutation::Insert(e) | Mutation::Update(e) | Mutation::Upsert(e) => &e.key,
            Mutation::Delete(k) => k,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update(_) => "update",
            Mutation::Upsert(_) => "upsert",
            Mutation::Delete(_) => "delete",
        }
    }
}

/// Outcome of one mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Set when the service allocated an id for an incomplete key
    pub key: Option<Key>,
    pub conflict_detected: bool,
    pub version: u64,
}

/// Commit response wire shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub mutation_results: Vec<MutationResult>,
    pub index_updates: u64,
}

impl CommitResponse {
    /// Keys allocated by the service, in mutation order
    pub fn allocated_keys(&self) -> Vec<Key> {
        self.mutation_results
            .iter()
            .filter_map(|r| r.key.clone())
            .collect()
    }
}
