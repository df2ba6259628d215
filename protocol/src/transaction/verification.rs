//! Transaction verification: structural checks and cryptographic validation.
//!
//! Every transaction is re-verified before a vertex is built around it and
//! again whenever a stored or gossiped vertex is validated. Checks run from
//! cheapest to most expensive so that clearly malformed input is rejected
//! before any signature work.

use thiserror::Error;

use super::builder::{now_nanos, Transaction};
use crate::config::{MAX_FUTURE_SECONDS, MAX_SUBJECT_LENGTH, MAX_TRANSACTION_DATA_BYTES};
use crate::crypto::{blake3_hash, Hash32, SignatureError, Verifier};
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while signing or verifying a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Hash32, actual: Hash32 },

    #[error("subject is {len} bytes (max {max})")]
    SubjectTooLong { len: usize, max: usize },

    #[error("data is {len} bytes (max {max})")]
    DataTooLarge { len: usize, max: usize },

    #[error("created_at {created_at_ns} is {delta_secs}s in the future (max allowed: {max_secs}s)")]
    TimestampTooFarInFuture {
        created_at_ns: i64,
        delta_secs: i64,
        max_secs: i64,
    },

    #[error("transaction is missing the issuer signature")]
    MissingIssuerSignature,

    #[error("transaction is missing the receiver signature")]
    MissingReceiverSignature,

    #[error("issuer signature invalid: {0}")]
    InvalidIssuerSignature(#[source] SignatureError),

    #[error("receiver signature invalid: {0}")]
    InvalidReceiverSignature(#[source] SignatureError),

    #[error("signer {actual} does not own {expected}")]
    SignerMismatch { expected: Address, actual: Address },
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies a fully signed transaction.
///
/// The checks, in order:
///
/// 1. **Size limits** on subject and data.
/// 2. **Timestamp** no more than [`MAX_FUTURE_SECONDS`] ahead of local time.
/// 3. **Hash** equals `blake3(signable_bytes)`.
/// 4. **Issuer signature** present and valid for the issuer address.
/// 5. **Receiver signature** present and valid for the receiver address.
///
/// Zero amounts and self-transfers are accepted; the balance layer decides
/// whether a transfer is affordable.
pub fn verify_transaction(tx: &Transaction, verifier: &dyn Verifier) -> Result<(), TransactionError> {
    if tx.subject.len() > MAX_SUBJECT_LENGTH {
        return Err(TransactionError::SubjectTooLong {
            len: tx.subject.len(),
            max: MAX_SUBJECT_LENGTH,
        });
    }
    if tx.data.len() > MAX_TRANSACTION_DATA_BYTES {
        return Err(TransactionError::DataTooLarge {
            len: tx.data.len(),
            max: MAX_TRANSACTION_DATA_BYTES,
        });
    }

    let now = now_nanos();
    let max_future = now.saturating_add(MAX_FUTURE_SECONDS * 1_000_000_000);
    if tx.created_at > max_future {
        return Err(TransactionError::TimestampTooFarInFuture {
            created_at_ns: tx.created_at,
            delta_secs: (tx.created_at - now) / 1_000_000_000,
            max_secs: MAX_FUTURE_SECONDS,
        });
    }

    let signable = tx.signable_bytes();
    let expected = blake3_hash(&signable);
    if tx.hash != expected {
        return Err(TransactionError::HashMismatch {
            expected,
            actual: tx.hash,
        });
    }

    let issuer_sig = tx
        .issuer_signature
        .as_ref()
        .ok_or(TransactionError::MissingIssuerSignature)?;
    verifier
        .verify(&signable, issuer_sig, &tx.hash, &tx.issuer)
        .map_err(TransactionError::InvalidIssuerSignature)?;

    let receiver_sig = tx
        .receiver_signature
        .as_ref()
        .ok_or(TransactionError::MissingReceiverSignature)?;
    verifier
        .verify(&signable, receiver_sig, &tx.hash, &tx.receiver)
        .map_err(TransactionError::InvalidReceiverSignature)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
