//! # Vertex
//!
//! A vertex is one signed unit of ledger history. It wraps exactly one
//! transaction and names two parent vertices, which turns the ledger into a
//! DAG: independent authors append concurrently without contending for a
//! single global tip.
//!
//! ## Digest
//!
//! ```text
//! digest = tx.hash | prev_hash | left_parent | right_parent | created_at (i64 LE)
//! hash   = blake3(digest)            (returned by the Signer)
//! sig    = Sign(issuer key, hash)
//! ```
//!
//! The genesis vertex is the one whose two parents are both
//! [`Hash32::ZERO`]. Every other vertex has two non-zero parents (they may
//! be the same hash when an author has only one tip to build on).

use serde::{Deserialize, Serialize};

use super::error::{LedgerError, LedgerResult};
use crate::config::DIGEST_SEPARATOR;
use crate::crypto::{Hash32, Signature, Signer, Verifier};
use crate::identity::Address;
use crate::transaction::{now_nanos, verify_transaction, Transaction};

/// An immutable, signed DAG node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub issuer: Address,
    /// Unix nanoseconds.
    pub created_at: i64,
    pub signature: Signature,
    pub transaction: Transaction,
    /// The signed digest; also the storage key.
    pub hash: Hash32,
    /// Previous vertex authored by the same node, zero if none.
    pub prev_hash: Hash32,
    pub left_parent: Hash32,
    pub right_parent: Hash32,
}

/// Canonical digest bytes for a vertex.
pub fn vertex_digest(
    tx_hash: &Hash32,
    prev_hash: &Hash32,
    left_parent: &Hash32,
    right_parent: &Hash32,
    created_at: i64,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 * 32 + 4 + 8);
    for part in [tx_hash, prev_hash, left_parent, right_parent] {
        buf.extend_from_slice(part.as_bytes());
        buf.push(DIGEST_SEPARATOR);
    }
    buf.extend_from_slice(&created_at.to_le_bytes());
    buf
}

impl Vertex {
    /// Builds and signs a new vertex around `transaction`.
    ///
    /// The transaction's own signature chain is verified first; no vertex
    /// is ever built around an unverifiable transaction. Storage is not
    /// touched.
    pub fn new(
        transaction: Transaction,
        prev_hash: Hash32,
        left_parent: Hash32,
        right_parent: Hash32,
        signer: &dyn Signer,
        verifier: &dyn Verifier,
    ) -> LedgerResult<Self> {
        verify_transaction(&transaction, verifier)?;
        check_parent_shape(&left_parent, &right_parent)?;

        let created_at = now_nanos();
        let digest = vertex_digest(
            &transaction.hash,
            &prev_hash,
            &left_parent,
            &right_parent,
            created_at,
        );
        let (hash, signature) = signer.sign(&digest);

        Ok(Self {
            issuer: signer.address(),
            created_at,
            signature,
            transaction,
            hash,
            prev_hash,
            left_parent,
            right_parent,
        })
    }

    /// Recomputes the digest and checks both the transaction chain and the
    /// vertex signature against `issuer`.
    pub fn validate(&self, verifier: &dyn Verifier) -> LedgerResult<()> {
        verify_transaction(&self.transaction, verifier)?;
        check_parent_shape(&self.left_parent, &self.right_parent)?;
        verifier.verify(&self.digest(), &self.signature, &self.hash, &self.issuer)?;
        Ok(())
    }

    pub fn digest(&self) -> Vec<u8> {
        vertex_digest(
            &self.transaction.hash,
            &self.prev_hash,
            &self.left_parent,
            &self.right_parent,
            self.created_at,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.left_parent.is_zero() && self.right_parent.is_zero()
    }

    /// Distinct non-zero parent hashes.
    pub fn parents(&self) -> Vec<Hash32> {
        let mut parents = Vec::with_capacity(2);
        if !self.left_parent.is_zero() {
            parents.push(self.left_parent);
        }
        if !self.right_parent.is_zero() && self.right_parent != self.left_parent {
            parents.push(self.right_parent);
        }
        parents
    }
}

fn check_parent_shape(left: &Hash32, right: &Hash32) -> LedgerResult<()> {
    if left.is_zero() != right.is_zero() {
        return Err(LedgerError::Validation(format!(
            "exactly one zero parent (left {left}, right {right})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Signer, Ed25519Verifier};
    use crate::transaction::{sign_as_issuer, sign_as_receiver, Spice, TransactionBuilder};

    fn signed_tx(issuer: &Ed25519Signer, receiver: &Ed25519Signer) -> Transaction {
        let mut tx = TransactionBuilder::new(issuer.address(), receiver.address())
            .subject("test")
            .spice(Spice::from_currency(7))
            .build();
        sign_as_issuer(&mut tx, issuer).unwrap();
        sign_as_receiver(&mut tx, receiver).unwrap();
        tx
    }

    fn parent(byte: u8) -> Hash32 {
        Hash32::from_bytes([byte; 32])
    }

    #[test]
    fn new_vertex_validates() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let v = Vertex::new(
            signed_tx(&a, &b),
            Hash32::ZERO,
            parent(1),
            parent(2),
            &node,
            &Ed25519Verifier,
        )
        .unwrap();

        assert_eq!(v.issuer, node.address());
        assert!(!v.is_genesis());
        assert_eq!(v.parents(), vec![parent(1), parent(2)]);
        v.validate(&Ed25519Verifier).unwrap();
    }

    #[test]
    fn hash_is_digest_hash() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let v = Vertex::new(
            signed_tx(&a, &b),
            Hash32::ZERO,
            Hash32::ZERO,
            Hash32::ZERO,
            &node,
            &Ed25519Verifier,
        )
        .unwrap();
        assert!(v.is_genesis());
        assert!(v.parents().is_empty());
        assert_eq!(v.hash, crate::crypto::blake3_hash(&v.digest()));
    }

    #[test]
    fn tampered_transaction_rejected_before_build() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let mut tx = signed_tx(&a, &b);
        tx.subject = "changed".into();

        let err = Vertex::new(tx, Hash32::ZERO, parent(1), parent(1), &node, &Ed25519Verifier)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn tampered_linkage_detected() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let mut v = Vertex::new(
            signed_tx(&a, &b),
            Hash32::ZERO,
            parent(1),
            parent(2),
            &node,
            &Ed25519Verifier,
        )
        .unwrap();
        v.right_parent = parent(3);
        assert!(matches!(
            v.validate(&Ed25519Verifier),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn forged_issuer_detected() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let mut v = Vertex::new(
            signed_tx(&a, &b),
            Hash32::ZERO,
            parent(1),
            parent(2),
            &node,
            &Ed25519Verifier,
        )
        .unwrap();
        v.issuer = a.address();
        assert!(v.validate(&Ed25519Verifier).is_err());
    }

    #[test]
    fn half_genesis_rejected() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let err = Vertex::new(
            signed_tx(&a, &b),
            Hash32::ZERO,
            Hash32::ZERO,
            parent(9),
            &node,
            &Ed25519Verifier,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn identical_parents_collapse() {
        let node = Ed25519Signer::generate();
        let (a, b) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let v = Vertex::new(
            signed_tx(&a, &b),
            parent(4),
            parent(4),
            parent(4),
            &node,
            &Ed25519Verifier,
        )
        .unwrap();
        assert_eq!(v.parents(), vec![parent(4)]);
    }
}
