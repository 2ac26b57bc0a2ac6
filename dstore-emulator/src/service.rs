/// In-memory datastore service
///
/// `Emulator` implements [`DatastoreRpc`] over an [`EntityStore`] and a
/// [`TransactionRegistry`]. All state sits behind one mutex that is taken
/// for the duration of a single call, so every call observes and produces a
/// consistent snapshot.

use crate::config::EmulatorConfig;
use crate::query;
use crate::store::EntityStore;
use crate::transaction::TransactionRegistry;
use async_trait::async_trait;
use dstore_core::validation::validate_project_id;
use dstore_core::{
    AllocateIdsRequest, AllocateIdsResponse, BeginTransactionRequest, BeginTransactionResponse,
    CommitMode, CommitRequest, CommitResponse, DatastoreRpc, Entity, Error, Key, LookupRequest,
    LookupResponse, Mutation, Result, RollbackRequest, RollbackResponse, RunQueryRequest,
    RunQueryResponse,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

struct EmulatorState {
    store: EntityStore,
    transactions: TransactionRegistry,
}

/// Per-call counters
#[derive(Debug, Default)]
struct EmulatorStatsAtomic {
    lookups: AtomicU64,
    queries: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    allocations: AtomicU64,
    conflicts: AtomicU64,
}

/// Snapshot of the emulator's call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmulatorStats {
    pub lookups: u64,
    pub queries: u64,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub allocations: u64,
    pub conflicts: u64,
}

pub struct Emulator {
    config: EmulatorConfig,
    state: Mutex<EmulatorState>,
    unavailable: AtomicBool,
    stats: EmulatorStatsAtomic,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::build(EmulatorConfig::default())
    }
}

impl Emulator {
    /// Create an emulator with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an emulator with a custom configuration
    pub fn with_config(config: EmulatorConfig) -> Result<Self> {
        config.validate()?;
        info!(
            query_batch_size = ?config.query_batch_size,
            lookup_batch_size = ?config.lookup_batch_size,
            first_id = config.first_id,
            "Starting datastore emulator"
        );
        Ok(Self::build(config))
    }

    fn build(config: EmulatorConfig) -> Self {
        Self {
            state: Mutex::new(EmulatorState {
                store: EntityStore::new(config.first_id),
                transactions: TransactionRegistry::new(),
            }),
            config,
            unavailable: AtomicBool::new(false),
            stats: EmulatorStatsAtomic::default(),
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Make every subsequent call fail with a transport error (or stop doing so)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> EmulatorStats {
        EmulatorStats {
            lookups: self.stats.lookups.load(Ordering::Relaxed),
            queries: self.stats.queries.load(Ordering::Relaxed),
            begins: self.stats.begins.load(Ordering::Relaxed),
            commits: self.stats.commits.load(Ordering::Relaxed),
            rollbacks: self.stats.rollbacks.load(Ordering::Relaxed),
            allocations: self.stats.allocations.load(Ordering::Relaxed),
            conflicts: self.stats.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Number of stored entities
    pub fn entity_count(&self) -> usize {
        self.state.lock().store.len()
    }

    /// Stored copy of an entity, bypassing the RPC surface
    pub fn entity(&self, key: &Key) -> Option<Entity> {
        self.state.lock().store.get(key).map(|stored| stored.entity.clone())
    }

    /// Transactions begun but not yet committed or rolled back
    pub fn open_transactions(&self) -> usize {
        self.state.lock().transactions.open_count()
    }

    /// Current store version
    pub fn version(&self) -> u64 {
        self.state.lock().store.version()
    }

    fn check_available(&self, project_id: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Transport("datastore emulator is unavailable".to_string()));
        }
        validate_project_id(project_id)
    }
}

#[async_trait]
impl DatastoreRpc for Emulator {
    async fn lookup(&self, request: LookupRequest) -> Result<LookupResponse> {
        self.check_available(&request.project_id)?;
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        request.read_options.validate()?;
        if let Some(key) = request.keys.iter().find(|k| k.is_incomplete()) {
            return Err(Error::InvalidKey(format!("cannot look up incomplete key {}", key)));
        }

        let mut keys = request.keys;
        let deferred = match self.config.lookup_batch_size {
            Some(size) if keys.len() > size => keys.split_off(size),
            _ => Vec::new(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(tx) = &request.read_options.transaction {
            state.transactions.record_reads(tx, keys.iter())?;
        }

        let mut response = LookupResponse {
            deferred,
            ..LookupResponse::default()
        };
        for key in keys {
            match state.store.get(&key) {
                Some(stored) => response.found.push(stored.entity.clone()),
                None => response.missing.push(key),
            }
        }

        debug!(
            found = response.found.len(),
            missing = response.missing.len(),
            deferred = response.deferred.len(),
            transactional = request.read_options.transaction.is_some(),
            "Lookup"
        );
        Ok(response)
    }

    async fn run_query(&self, request: RunQueryRequest) -> Result<RunQueryResponse> {
        self.check_available(&request.project_id)?;
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        request.read_options.validate()?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(tx) = &request.read_options.transaction {
            if !state.transactions.is_open(tx) {
                return Err(Error::InvalidArgument(format!(
                    "unknown or finished transaction {}",
                    tx
                )));
            }
        }

        let response = query::execute(&state.store, &request.query, self.config.query_batch_size)?;
        if let Some(tx) = &request.read_options.transaction {
            state
                .transactions
                .record_reads(tx, response.entities.iter().map(|e| &e.key))?;
        }

        debug!(
            kind = request.query.kind(),
            returned = response.entities.len(),
            skipped = response.skipped_results,
            more_results = ?response.more_results,
            "Query batch"
        );
        Ok(response)
    }

    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse> {
        self.check_available(&request.project_id)?;
        self.stats.begins.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let version = state.store.version();
        let transaction = state.transactions.begin(version, request.options);

        debug!(
            transaction = %transaction,
            version,
            read_only = request.options.read_only,
            "Began transaction"
        );
        Ok(BeginTransactionResponse { transaction })
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse> {
        self.check_available(&request.project_id)?;
        self.stats.commits.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let CommitMode::Transactional(id) = &request.mode {
            let tx = state.transactions.finish(id)?;
            if tx.read_only && !request.mutations.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "read-only transaction {} cannot commit mutations",
                    id
                )));
            }

            let conflict = tx
                .read_set
                .iter()
                .chain(request.mutations.iter().map(Mutation::key))
                .find(|key| state.store.last_modified(key) > tx.begin_version);
            if let Some(key) = conflict {
                self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transaction = %id,
                    key = %key,
                    begin_version = tx.begin_version,
                    "Transaction conflict"
                );
                return Err(Error::Conflict(format!(
                    "{} was modified after transaction {} began",
                    key, id
                )));
            }
        }

        let mutation_count = request.mutations.len();
        let applied = state.store.apply(request.mutations)?;

        debug!(
            version = applied.version,
            mutations = mutation_count,
            index_updates = applied.index_updates,
            transactional = matches!(request.mode, CommitMode::Transactional(_)),
            "Committed"
        );
        Ok(CommitResponse {
            mutation_results: applied.results,
            index_updates: applied.index_updates,
        })
    }

    async fn rollback(&self, request: RollbackRequest) -> Result<RollbackResponse> {
        self.check_available(&request.project_id)?;
        self.stats.rollbacks.fetch_add(1, Ordering::Relaxed);

        self.state.lock().transactions.finish(&request.transaction)?;
        debug!(transaction = %request.transaction, "Rolled back transaction");
        Ok(RollbackResponse {})
    }

    async fn allocate_ids(&self, request: AllocateIdsRequest) -> Result<AllocateIdsResponse> {
        self.check_available(&request.project_id)?;
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.state.lock();
        let keys = request
            .keys
            .iter()
            .map(|key| guard.store.allocate(key))
            .collect::<Result<Vec<_>>>()?;

        debug!(count = keys.len(), "Allocated ids");
        Ok(AllocateIdsResponse { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstore_core::{
        BatchState, Query, ReadOptions, TransactionId, TransactionOptions,
    };

    const PROJECT: &str = "test-project";

    fn task(name: &str) -> Entity {
        Entity::new(Key::named("Task", name).unwrap()).set("priority", 1)
    }

    async fn commit(emulator: &Emulator, mode: CommitMode, mutations: Vec<Mutation>) -> Result<CommitResponse> {
        emulator
            .commit(CommitRequest {
                project_id: PROJECT.to_string(),
                mode,
                mutations,
            })
            .await
    }

    async fn begin(emulator: &Emulator, options: TransactionOptions) -> TransactionId {
        emulator
            .begin_transaction(BeginTransactionRequest {
                project_id: PROJECT.to_string(),
                options,
            })
            .await
            .unwrap()
            .transaction
    }

    #[tokio::test]
    async fn test_lookup_found_and_missing() {
        let emulator = Emulator::new();
        commit(&emulator, CommitMode::NonTransactional, vec![Mutation::Upsert(task("a"))])
            .await
            .unwrap();

        let response = emulator
            .lookup(LookupRequest {
                project_id: PROJECT.to_string(),
                read_options: ReadOptions::default(),
                keys: vec![Key::named("Task", "a").unwrap(), Key::named("Task", "b").unwrap()],
            })
            .await
            .unwrap();
        assert_eq!(response.found.len(), 1);
        assert_eq!(response.missing.len(), 1);
        assert!(response.deferred.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_defers_past_batch_size() {
        let emulator = Emulator::with_config(EmulatorConfig::new().with_lookup_batch_size(2)).unwrap();
        let keys: Vec<Key> = (1..=5).map(|i| Key::with_id("Task", i).unwrap()).collect();
        let response = emulator
            .lookup(LookupRequest {
                project_id: PROJECT.to_string(),
                read_options: ReadOptions::default(),
                keys,
            })
            .await
            .unwrap();
        assert_eq!(response.missing.len(), 2);
        assert_eq!(response.deferred.len(), 3);
    }

    #[tokio::test]
    async fn test_transaction_conflict_on_read_key() {
        let emulator = Emulator::new();
        commit(&emulator, CommitMode::NonTransactional, vec![Mutation::Upsert(task("a"))])
            .await
            .unwrap();

        let tx = begin(&emulator, TransactionOptions::default()).await;
        emulator
            .lookup(LookupRequest {
                project_id: PROJECT.to_string(),
                read_options: ReadOptions {
                    consistency: None,
                    transaction: Some(tx.clone()),
                },
                keys: vec![Key::named("Task", "a").unwrap()],
            })
            .await
            .unwrap();

        // A concurrent writer changes the entity the transaction read
        commit(&emulator, CommitMode::NonTransactional, vec![Mutation::Upsert(task("a"))])
            .await
            .unwrap();

        let err = commit(
            &emulator,
            CommitMode::Transactional(tx),
            vec![Mutation::Upsert(task("b"))],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(emulator.entity(&Key::named("Task", "b").unwrap()).is_none());
        assert_eq!(emulator.stats().conflicts, 1);
        assert_eq!(emulator.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_read_only_transaction_rejects_mutations() {
        let emulator = Emulator::new();
        let tx = begin(&emulator, TransactionOptions::read_only()).await;
        let err = commit(
            &emulator,
            CommitMode::Transactional(tx),
            vec![Mutation::Upsert(task("a"))],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_rollback_finishes_transaction() {
        let emulator = Emulator::new();
        let tx = begin(&emulator, TransactionOptions::default()).await;
        emulator
            .rollback(RollbackRequest {
                project_id: PROJECT.to_string(),
                transaction: tx.clone(),
            })
            .await
            .unwrap();
        assert_eq!(emulator.open_transactions(), 0);
        assert!(commit(&emulator, CommitMode::Transactional(tx), vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_allocate_ids() {
        let emulator = Emulator::with_config(EmulatorConfig::new().with_first_id(500)).unwrap();
        let response = emulator
            .allocate_ids(AllocateIdsRequest {
                project_id: PROJECT.to_string(),
                keys: vec![Key::incomplete("Task").unwrap(); 3],
            })
            .await
            .unwrap();
        let ids: Vec<i64> = response.keys.iter().filter_map(Key::id).collect();
        assert_eq!(ids, vec![500, 501, 502]);
        assert_eq!(emulator.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let emulator = Emulator::new();
        emulator.set_unavailable(true);
        let err = emulator
            .run_query(RunQueryRequest {
                project_id: PROJECT.to_string(),
                read_options: ReadOptions::default(),
                query: Query::new("Task"),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        emulator.set_unavailable(false);
        let response = emulator
            .run_query(RunQueryRequest {
                project_id: PROJECT.to_string(),
                read_options: ReadOptions::default(),
                query: Query::new("Task"),
            })
            .await
            .unwrap();
        assert_eq!(response.more_results, BatchState::NoMoreResults);
    }

    #[tokio::test]
    async fn test_invalid_project_rejected() {
        let emulator = Emulator::new();
        let err = emulator
            .allocate_ids(AllocateIdsRequest {
                project_id: String::new(),
                keys: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
