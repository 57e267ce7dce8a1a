//! Error types for grading and storage.
//!
//! [`StoreError`] is what storage collaborators return. [`GradingError`] is
//! what the engine surfaces to its caller; its [`ErrorCode`] tells the
//! transport layer which status class to answer with.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur inside a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing backing files failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure (connection loss, aborted transaction, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Status class of a [`GradingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed request, rejected before any storage access.
    InvalidArgument,
    /// The request is well-formed but cannot be graded in the current state.
    FailedPrecondition,
    /// Storage or transport failure.
    Internal,
    /// The caller cancelled the operation.
    Cancelled,
}

/// Errors surfaced by the grading engine.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// A storage call failed; `op` names the capability that was called.
    #[error("{op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl GradingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GradingError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GradingError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            GradingError::Internal(_) | GradingError::Storage { .. } => ErrorCode::Internal,
            GradingError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Wrap a storage failure with the name of the failing call.
    pub fn storage(op: &'static str) -> impl FnOnce(StoreError) -> GradingError {
        move |source| GradingError::Storage { op, source }
    }

    /// Like [`GradingError::storage`], but a missing record is reported as a
    /// failed precondition instead of an internal error.
    pub fn lookup(op: &'static str) -> impl FnOnce(StoreError) -> GradingError {
        move |source| match source {
            StoreError::NotFound(what) => {
                GradingError::FailedPrecondition(format!("{op}: {what} not found"))
            }
            source => GradingError::Storage { op, source },
        }
    }
}
