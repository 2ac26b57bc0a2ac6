/// Emulator configuration
use dstore_core::{Error, Result};

/// Tuning knobs that shape how the emulator splits work across calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Maximum entities returned by one `run_query` call (None = unlimited).
    /// When a batch is cut short the response is `NotFinished`.
    pub query_batch_size: Option<usize>,

    /// Maximum keys resolved by one `lookup` call (None = unlimited).
    /// Remaining keys are returned as deferred.
    pub lookup_batch_size: Option<usize>,

    /// First id handed out by the id allocator
    pub first_id: i64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            query_batch_size: None,
            lookup_batch_size: None,
            first_id: 1,
        }
    }
}

impl EmulatorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call query batch size
    pub fn with_query_batch_size(mut self, size: usize) -> Self {
        self.query_batch_size = Some(size);
        self
    }

    /// Set the per-call lookup batch size
    pub fn with_lookup_batch_size(mut self, size: usize) -> Self {
        self.lookup_batch_size = Some(size);
        self
    }

    /// Set the first allocated id
    pub fn with_first_id(mut self, id: i64) -> Self {
        self.first_id = id;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.query_batch_size == Some(0) {
            return Err(Error::InvalidArgument(
                "query_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.lookup_batch_size == Some(0) {
            return Err(Error::InvalidArgument(
                "lookup_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.first_id < 1 {
            return Err(Error::InvalidArgument("first_id must be positive".to_string()));
        }
        Ok(())
    }
}
