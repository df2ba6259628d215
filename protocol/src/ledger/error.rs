//! Error taxonomy for the DAG ledger.
//!
//! Every public ledger operation returns a [`LedgerError`]. Validation and
//! conflict errors are terminal for the vertex in question and are never
//! retried inside the ledger. Storage failures bubble up unchanged.

use thiserror::Error;

use crate::crypto::SignatureError;
use crate::storage::DbError;
use crate::transaction::{SpiceError, TransactionError};

/// Errors produced by the ledger engine.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad signature, bad digest, malformed transaction chain.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown vertex hash or unknown parent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate vertex, second genesis, insufficient funds, overflow.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The underlying store failed. Fatal to the operation.
    #[error("storage error: {0}")]
    Io(#[from] DbError),

    /// Malformed replication traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A shutdown signal interrupted a long-running operation.
    #[error("operation cancelled")]
    Cancelled,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// True for errors caused by the store rather than by the input.
    pub fn is_io(&self) -> bool {
        matches!(self, LedgerError::Io(_))
    }
}

impl From<TransactionError> for LedgerError {
    fn from(e: TransactionError) -> Self {
        LedgerError::Validation(format!("transaction: {e}"))
    }
}

impl From<SignatureError> for LedgerError {
    fn from(e: SignatureError) -> Self {
        LedgerError::Validation(format!("vertex signature: {e}"))
    }
}

impl From<SpiceError> for LedgerError {
    fn from(e: SpiceError) -> Self {
        LedgerError::Conflict(e.to_string())
    }
}
