//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] assembles the fields, stamps the creation
//! time and computes the content hash. It does not sign: issuer and
//! receiver signatures are added afterwards in [`super::signing`], which
//! keeps construction testable without key material.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::spice::Spice;
use crate::config::TRANSACTION_FORMAT_VERSION;
use crate::crypto::hash::{blake3_hash, Hash32};
use crate::crypto::keys::Signature;
use crate::identity::Address;

/// Current UTC time in nanoseconds since the Unix epoch.
///
/// Saturates to zero outside the representable range (~year 2262).
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A dual-signed value transfer.
///
/// `hash` is the BLAKE3 digest of [`Transaction::signable_bytes`]. Both
/// parties sign that same byte string, so the digest a [`Signer`] returns
/// for either signature equals `hash`.
///
/// [`Signer`]: crate::crypto::Signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Creation time, Unix nanoseconds.
    pub created_at: i64,

    /// `blake3(signable_bytes)`.
    pub hash: Hash32,

    /// Address debited by this transaction.
    pub issuer: Address,

    /// Address credited by this transaction.
    pub receiver: Address,

    /// Short human-readable description.
    pub subject: String,

    /// Opaque application payload.
    pub data: Vec<u8>,

    /// Amount moved from issuer to receiver.
    pub spice: Spice,

    pub issuer_signature: Option<Signature>,
    pub receiver_signature: Option<Signature>,
}

impl Transaction {
    /// Canonical bytes covered by the hash and by both signatures.
    ///
    /// Fixed-width little-endian integers, NUL-terminated addresses and
    /// length-prefixed variable fields. Signatures and the hash itself are
    /// excluded.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(192 + self.subject.len() + self.data.len());

        buf.extend_from_slice(&TRANSACTION_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.created_at.to_le_bytes());

        buf.extend_from_slice(self.issuer.as_str().as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(self.receiver.as_str().as_bytes());
        buf.push(0x00);

        buf.extend_from_slice(&(self.subject.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.subject.as_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);

        buf.extend_from_slice(&self.spice.to_le_bytes());
        buf
    }

    /// Recomputes the content hash from the current field values.
    pub fn compute_hash(&self) -> Hash32 {
        blake3_hash(&self.signable_bytes())
    }

    /// Both parties have signed.
    pub fn is_fully_signed(&self) -> bool {
        self.issuer_signature.is_some() && self.receiver_signature.is_some()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`]s.
///
/// ```rust,no_run
/// use accountant_protocol::crypto::{Ed25519Signer, Signer};
/// use accountant_protocol::transaction::{Spice, TransactionBuilder};
///
/// let alice = Ed25519Signer::generate();
/// let bob = Ed25519Signer::generate();
/// let tx = TransactionBuilder::new(alice.address(), bob.address())
///     .subject("rent")
///     .spice(Spice::from_currency(12))
///     .build();
/// assert!(!tx.is_fully_signed());
/// ```
pub struct TransactionBuilder {
    issuer: Address,
    receiver: Address,
    subject: String,
    data: Vec<u8>,
    spice: Spice,
    created_at: Option<i64>,
}

impl TransactionBuilder {
    /// Starts a zero-amount transfer from `issuer` to `receiver`.
    pub fn new(issuer: Address, receiver: Address) -> Self {
        Self {
            issuer,
            receiver,
            subject: String::new(),
            data: Vec::new(),
            spice: Spice::ZERO,
            created_at: None,
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn spice(mut self, spice: Spice) -> Self {
        self.spice = spice;
        self
    }

    /// Pins the creation time (Unix nanoseconds). Defaults to now.
    pub fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Produces the unsigned transaction with its hash filled in.
    pub fn build(self) -> Transaction {
        let mut tx = Transaction {
            created_at: self.created_at.unwrap_or_else(now_nanos),
            hash: Hash32::ZERO,
            issuer: self.issuer,
            receiver: self.receiver,
            subject: self.subject,
            data: self.data,
            spice: self.spice,
            issuer_signature: None,
            receiver_signature: None,
        };
        tx.hash = tx.compute_hash();
        tx
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
