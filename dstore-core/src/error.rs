use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Invalid transaction state: {0}")]
    TransactionState(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// Codes follow the service's status vocabulary so callers can match on
    /// them without depending on message text.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "UNAVAILABLE",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            Error::InvalidKey(_) => "INVALID_KEY",
            Error::InvalidQuery(_) => "INVALID_QUERY",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "ABORTED",
            Error::TransactionState(_) => "FAILED_PRECONDITION",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Returns true if the operation may succeed when issued again.
    ///
    /// A `Conflict` is retryable only by re-running the whole transaction;
    /// the client itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Conflict(_) => true,

            Error::Unauthenticated(_) => false,
            Error::InvalidKey(_) => false,
            Error::InvalidQuery(_) => false,
            Error::InvalidArgument(_) => false,
            Error::AlreadyExists(_) => false,
            Error::NotFound(_) => false,
            Error::TransactionState(_) => false,
            Error::Io(_) => false,
            Error::Json(_) => false,
            Error::Internal(_) => false,
        }
    }

    /// True for the entity-precondition failures raised by insert and update.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, Error::AlreadyExists(_) | Error::NotFound(_))
    }

    /// Adds context to an error by wrapping it in an Internal error.
    ///
    /// # Examples
    ///
    /// ```
    /// use dstore_core::Error;
    ///
    /// let err = Error::Transport("connection reset".into()).with_context("lookup");
    /// assert_eq!(err.to_string(), "Internal error: lookup: Transport error: connection reset");
    /// ```
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::Transport("x".into()).code(), "UNAVAILABLE");
        assert_eq!(Error::AlreadyExists("x".into()).code(), "ALREADY_EXISTS");
        assert_eq!(Error::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(Error::Conflict("x".into()).code(), "ABORTED");
        assert_eq!(Error::TransactionState("x".into()).code(), "FAILED_PRECONDITION");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(Error::Conflict("tx".into()).is_retryable());
        assert!(!Error::AlreadyExists("k".into()).is_retryable());
        assert!(!Error::InvalidQuery("q".into()).is_retryable());
    }

    #[test]
    fn test_precondition_failures() {
        assert!(Error::AlreadyExists("k".into()).is_precondition_failure());
        assert!(Error::NotFound("k".into()).is_precondition_failure());
        assert!(!Error::Conflict("k".into()).is_precondition_failure());
    }
}
