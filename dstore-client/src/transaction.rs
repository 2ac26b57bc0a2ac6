/// Optimistic transactions
///
/// A transaction is begun with `run`, collects mutations locally, and ends
/// with exactly one `commit` or `rollback`. Reads made through an active
/// transaction are tracked by the service; if any entity read or written was
/// changed by someone else after `run`, the commit fails with a conflict and
/// the whole unit of work has to be retried in a new transaction.

use crate::client::Datastore;
use crate::request::Requests;
use async_trait::async_trait;
use dstore_core::{
    BeginTransactionRequest, BeginTransactionResponse, CommitMode, CommitRequest, CommitResponse,
    Consistency, DatastoreRpc, Error, Mutation, QueryOptions, ReadOptions, Result,
    Query, RollbackRequest, TransactionId, TransactionOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created, `run` not called yet
    NotStarted,
    /// Begun; reads and mutations allowed
    Active,
    /// `commit` was called (successfully or not)
    Committed,
    /// `rollback` was called
    RolledBack,
}

pub struct Transaction {
    datastore: Datastore,
    options: TransactionOptions,
    state: TransactionState,
    id: Option<TransactionId>,
    mutations: Mutex<Vec<Mutation>>,
}

impl Transaction {
    pub(crate) fn new(datastore: Datastore, options: TransactionOptions) -> Self {
        Self {
            datastore,
            options,
            state: TransactionState::NotStarted,
            id: None,
            mutations: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Service token, set once `run` succeeded
    pub fn id(&self) -> Option<&TransactionId> {
        self.id.as_ref()
    }

    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    /// Mutations buffered so far, in submission order
    pub fn pending_mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().clone()
    }

    /// Query over a kind in the client's namespace, to be run through this
    /// transaction
    pub fn create_query(&self, kind: impl Into<String>) -> Query {
        self.datastore.create_query(kind)
    }

    /// Query over a kind in an explicit namespace
    pub fn create_query_in(&self, namespace: impl Into<String>, kind: impl Into<String>) -> Query {
        self.datastore.create_query_in(namespace, kind)
    }

    /// Begin the transaction on the service
    pub async fn run(&mut self) -> Result<BeginTransactionResponse> {
        if self.state != TransactionState::NotStarted {
            return Err(self.state_error("run"));
        }
        let response = self
            .rpc()
            .begin_transaction(BeginTransactionRequest {
                project_id: self.project_id().to_string(),
                options: self.options,
            })
            .await?;

        debug!(
            transaction = %response.transaction,
            read_only = self.options.read_only,
            "Transaction started"
        );
        self.id = Some(response.transaction.clone());
        self.state = TransactionState::Active;
        Ok(response)
    }

    /// Apply the buffered mutations atomically. The transaction is finished
    /// afterwards whatever the outcome.
    pub async fn commit(&mut self) -> Result<CommitResponse> {
        let id = self.active_id("commit")?;
        let mutations = std::mem::take(self.mutations.get_mut());
        let count = mutations.len();
        self.state = TransactionState::Committed;

        let result = self
            .rpc()
            .commit(CommitRequest {
                project_id: self.project_id().to_string(),
                mode: CommitMode::Transactional(id.clone()),
                mutations,
            })
            .await;

        match &result {
            Ok(response) => debug!(
                transaction = %id,
                mutations = count,
                index_updates = response.index_updates,
                "Transaction committed"
            ),
            Err(e) => warn!(transaction = %id, error = %e, "Transaction commit failed"),
        }
        result
    }

    /// Discard the buffered mutations and release the transaction
    pub async fn rollback(&mut self) -> Result<()> {
        let id = self.active_id("rollback")?;
        self.mutations.get_mut().clear();
        self.state = TransactionState::RolledBack;

        self.rpc()
            .rollback(RollbackRequest {
                project_id: self.project_id().to_string(),
                transaction: id.clone(),
            })
            .await?;
        debug!(transaction = %id, "Transaction rolled back");
        Ok(())
    }

    fn active_id(&self, operation: &str) -> Result<TransactionId> {
        match (&self.state, &self.id) {
            (TransactionState::Active, Some(id)) => Ok(id.clone()),
            _ => Err(self.state_error(operation)),
        }
    }

    fn state_error(&self, operation: &str) -> Error {
        Error::TransactionState(format!(
            "cannot {} a transaction in state {:?}",
            operation, self.state
        ))
    }
}

#[async_trait]
impl Requests for Transaction {
    type Output = ();

    fn rpc(&self) -> &Arc<dyn DatastoreRpc> {
        self.datastore.rpc()
    }

    fn project_id(&self) -> &str {
        self.datastore.project_id()
    }

    /// Reads are bound to the transaction and always strongly consistent
    fn read_options(&self, options: &QueryOptions) -> Result<ReadOptions> {
        let id = self.active_id("read through")?;
        if options.consistency == Some(Consistency::Eventual) {
            return Err(Error::InvalidArgument(
                "eventual consistency cannot be used inside a transaction".to_string(),
            ));
        }
        Ok(ReadOptions {
            consistency: None,
            transaction: Some(id),
        })
    }

    /// Buffer mutations until commit
    async fn submit(&self, mutations: Vec<Mutation>) -> Result<()> {
        self.active_id("mutate")?;
        let mut buffer = self.mutations.lock();
        debug!(
            buffered = mutations.len(),
            pending = buffer.len() + mutations.len(),
            "Buffered transaction mutations"
        );
        buffer.extend(mutations);
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        let Some(id) = self.id.take() else {
            return;
        };
        warn!(
            transaction = %id,
            pending = self.mutations.get_mut().len(),
            "Transaction dropped while active; its mutations are discarded"
        );

        // Release the service-side transaction when a runtime is available
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let rpc = Arc::clone(self.datastore.rpc());
            let request = RollbackRequest {
                project_id: self.datastore.project_id().to_string(),
                transaction: id,
            };
            handle.spawn(async move {
                if let Err(e) = rpc.rollback(request).await {
                    debug!(error = %e, "Rollback of dropped transaction failed");
                }
            });
        }
    }
}
