/// Versioned in-memory entity table
///
/// Every commit bumps a global version. The table remembers the version at
/// which each key last changed (deletes included), which is what optimistic
/// transactions check against at commit time.

use dstore_core::{Entity, Error, Key, Mutation, MutationResult, Result};
use std::collections::{BTreeMap, HashMap};

/// An entity together with the version that wrote it
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity: Entity,
    pub version: u64,
}

/// Outcome of applying a batch of mutations
#[derive(Debug, Clone)]
pub struct AppliedCommit {
    pub version: u64,
    pub results: Vec<MutationResult>,
    pub index_updates: u64,
}

pub struct EntityStore {
    entities: BTreeMap<Key, StoredEntity>,
    last_modified: HashMap<Key, u64>,
    version: u64,
    next_id: i64,
}

impl EntityStore {
    pub fn new(first_id: i64) -> Self {
        Self {
            entities: BTreeMap::new(),
            last_modified: HashMap::new(),
            version: 0,
            next_id: first_id,
        }
    }

    /// Current global version
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: &Key) -> Option<&StoredEntity> {
        self.entities.get(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All stored entities in key order
    pub fn iter(&self) -> impl Iterator<Item = &StoredEntity> {
        self.entities.values()
    }

    /// Version at which `key` last changed (0 = never written)
    pub fn last_modified(&self, key: &Key) -> u64 {
        self.last_modified.get(key).copied().unwrap_or(0)
    }

    /// Complete an incomplete key with a fresh id
    pub fn allocate(&mut self, key: &Key) -> Result<Key> {
        if key.is_complete() {
            return Err(Error::InvalidKey(format!(
                "cannot allocate an id for complete key {}",
                key
            )));
        }
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| Error::Internal("id space exhausted".to_string()))?;
        key.complete_with_id(id)
    }

    /// Apply mutations atomically: either all preconditions hold and every
    /// mutation is written at one new version, or nothing changes.
    pub fn apply(&mut self, mutations: Vec<Mutation>) -> Result<AppliedCommit> {
        // Staged view of every key touched so far: Some = present, None = deleted
        let mut staged: BTreeMap<Key, Option<Entity>> = BTreeMap::new();
        let mut allocated: Vec<Option<Key>> = Vec::with_capacity(mutations.len());
        let mut index_updates = 0u64;

        for mutation in mutations {
            let (key, new_entity, allocated_key) = match mutation {
                Mutation::Insert(entity) | Mutation::Upsert(entity)
                    if entity.key.is_incomplete() =>
                {
                    let key = self.allocate(&entity.key)?;
                    let entity = Entity { key: key.clone(), ..entity };
                    (key.clone(), Some(entity), Some(key))
                }
                Mutation::Insert(entity) => {
                    if self.staged_exists(&staged, &entity.key) {
                        return Err(Error::AlreadyExists(entity.key.to_string()));
                    }
                    (entity.key.clone(), Some(entity), None)
                }
                Mutation::Update(entity) => {
                    require_complete(&entity.key)?;
                    if !self.staged_exists(&staged, &entity.key) {
                        return Err(Error::NotFound(entity.key.to_string()));
                    }
                    (entity.key.clone(), Some(entity), None)
                }
                Mutation::Upsert(entity) => (entity.key.clone(), Some(entity), None),
                Mutation::Delete(key) => {
                    require_complete(&key)?;
                    (key, None, None)
                }
            };

            let old_entries = self
                .staged_entity(&staged, &key)
                .map(Entity::index_entries)
                .unwrap_or(0);
            let new_entries = new_entity.as_ref().map(Entity::index_entries).unwrap_or(0);
            index_updates += old_entries + new_entries;

            staged.insert(key, new_entity);
            allocated.push(allocated_key);
        }

        self.version += 1;
        let version = self.version;
        for (key, entity) in staged {
            self.last_modified.insert(key.clone(), version);
            match entity {
                Some(entity) => {
                    self.entities.insert(key, StoredEntity { entity, version });
                }
                None => {
                    self.entities.remove(&key);
                }
            }
        }

        let results = allocated
            .into_iter()
            .map(|key| MutationResult {
                key,
                conflict_detected: false,
                version,
            })
            .collect();

        Ok(AppliedCommit {
            version,
            results,
            index_updates,
        })
    }

    fn staged_entity<'a>(
        &'a self,
        staged: &'a BTreeMap<Key, Option<Entity>>,
        key: &Key,
    ) -> Option<&'a Entity> {
        match staged.get(key) {
            Some(entry) => entry.as_ref(),
            None => self.entities.get(key).map(|stored| &stored.entity),
        }
    }

    fn staged_exists(&self, staged: &BTreeMap<Key, Option<Entity>>, key: &Key) -> bool {
        self.staged_entity(staged, key).is_some()
    }
}

fn require_complete(key: &Key) -> Result<()> {
    if key.is_incomplete() {
        return Err(Error::InvalidKey(format!("key {} is incomplete", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> Entity {
        Entity::new(Key::named("Task", name).unwrap()).set("done", false)
    }

    #[test]
    fn test_insert_then_insert_fails() {
        let mut store = EntityStore::new(1);
        store.apply(vec![Mutation::Insert(task("a"))]).unwrap();

        let err = store.apply(vec![Mutation::Insert(task("a"))]).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_update_missing_fails() {
        let mut store = EntityStore::new(1);
        let err = store.apply(vec![Mutation::Update(task("a"))]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_batch_changes_nothing() {
        let mut store = EntityStore::new(1);
        store.apply(vec![Mutation::Insert(task("a"))]).unwrap();

        let result = store.apply(vec![
            Mutation::Upsert(task("b")),
            Mutation::Insert(task("a")),
        ]);
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_modified(&Key::named("Task", "b").unwrap()), 0);
    }

    #[test]
    fn test_mutations_apply_in_order() {
        let mut store = EntityStore::new(1);
        let key = Key::named("Task", "a").unwrap();
        let applied = store
            .apply(vec![Mutation::Upsert(task("a")), Mutation::Delete(key.clone())])
            .unwrap();

        assert!(store.get(&key).is_none());
        assert_eq!(store.last_modified(&key), applied.version);
        // one entry written, then the same entry removed
        assert_eq!(applied.index_updates, 2);
    }

    #[test]
    fn test_incomplete_insert_allocates() {
        let mut store = EntityStore::new(100);
        let entity = Entity::new(Key::incomplete("Task").unwrap()).set("x", 1);
        let applied = store.apply(vec![Mutation::Insert(entity)]).unwrap();

        let key = applied.results[0].key.clone().unwrap();
        assert_eq!(key.id(), Some(100));
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_delete_requires_complete_key() {
        let mut store = EntityStore::new(1);
        let err = store
            .apply(vec![Mutation::Delete(Key::incomplete("Task").unwrap())])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_allocate_rejects_complete_key() {
        let mut store = EntityStore::new(1);
        assert!(store.allocate(&Key::named("Task", "a").unwrap()).is_err());
        let first = store.allocate(&Key::incomplete("Task").unwrap()).unwrap();
        let second = store.allocate(&Key::incomplete("Task").unwrap()).unwrap();
        assert_ne!(first, second);
    }
}
