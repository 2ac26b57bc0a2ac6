/// Server-side transaction registry
use dstore_core::{Error, Key, Result, TransactionId, TransactionOptions};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Bookkeeping for one open transaction
#[derive(Debug, Clone)]
pub struct OpenTransaction {
    /// Store version observed when the transaction began
    pub begin_version: u64,
    pub read_only: bool,
    /// Keys read through the transaction
    pub read_set: HashSet<Key>,
}

#[derive(Debug, Default)]
pub struct TransactionRegistry {
    open: HashMap<TransactionId, OpenTransaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction at `version` and return its token
    pub fn begin(&mut self, version: u64, options: TransactionOptions) -> TransactionId {
        let id = TransactionId::new(Uuid::new_v4().to_string());
        self.open.insert(
            id.clone(),
            OpenTransaction {
                begin_version: version,
                read_only: options.read_only,
                read_set: HashSet::new(),
            },
        );
        id
    }

    /// Record keys read through an open transaction
    pub fn record_reads<'a>(
        &mut self,
        id: &TransactionId,
        keys: impl IntoIterator<Item = &'a Key>,
    ) -> Result<()> {
        let tx = self.open.get_mut(id).ok_or_else(|| unknown(id))?;
        tx.read_set.extend(keys.into_iter().cloned());
        Ok(())
    }

    pub fn is_open(&self, id: &TransactionId) -> bool {
        self.open.contains_key(id)
    }

    /// Close a transaction, returning its bookkeeping
    pub fn finish(&mut self, id: &TransactionId) -> Result<OpenTransaction> {
        self.open.remove(id).ok_or_else(|| unknown(id))
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

fn unknown(id: &TransactionId) -> Error {
    Error::InvalidArgument(format!("unknown or finished transaction {}", id))
}
