//! # Signer / Verifier
//!
//! The ledger never talks to ed25519-dalek directly. It signs through the
//! [`Signer`] trait and checks signatures through the [`Verifier`] trait, so
//! a node can swap in a remote or hardware signer without touching the
//! vertex or transaction code.
//!
//! Both traits work on digests: `sign` hashes the message with BLAKE3 and
//! signs the resulting [`Hash32`]; `verify` recomputes the digest, compares
//! it with the claimed one and checks the signature over it against the
//! public key embedded in the address.

use thiserror::Error;

use super::hash::{blake3_hash, Hash32};
use super::keys::{Keypair, Signature};
use crate::identity::{Address, AddressError};

/// Errors during signature verification.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("digest mismatch: message hashes to {computed}, claimed {claimed}")]
    DigestMismatch { computed: Hash32, claimed: Hash32 },

    #[error("signature verification failed for {address}")]
    VerificationFailed { address: Address },

    #[error("invalid signer address: {0}")]
    InvalidAddress(#[from] AddressError),
}

/// Produces detached signatures over message digests.
pub trait Signer: Send + Sync {
    /// Hashes `message` and signs the digest. Returns `(digest, signature)`.
    fn sign(&self, message: &[u8]) -> (Hash32, Signature);

    /// The address whose key produces these signatures.
    fn address(&self) -> Address;
}

/// Checks detached signatures produced by a [`Signer`].
pub trait Verifier: Send + Sync {
    /// Verifies that `digest` is the hash of `message` and that `signature`
    /// is a valid signature over `digest` by the key behind `address`.
    fn verify(
        &self,
        message: &[u8],
        signature: &Signature,
        digest: &Hash32,
        address: &Address,
    ) -> Result<(), SignatureError>;
}

/// [`Signer`] backed by a local Ed25519 keypair.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    keypair: Keypair,
    address: Address,
}

impl Ed25519Signer {
    pub fn new(keypair: Keypair) -> Self {
        let address = Address::from_public_key(&keypair.public_key());
        Self { keypair, address }
    }

    /// Generates a fresh key. Convenient for ephemeral nodes and tests.
    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> (Hash32, Signature) {
        let digest = blake3_hash(message);
        let signature = self.keypair.sign(digest.as_bytes());
        (digest, signature)
    }

    fn address(&self) -> Address {
        self.address.clone()
    }
}

/// Stateless [`Verifier`] for Ed25519 signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &Signature,
        digest: &Hash32,
        address: &Address,
    ) -> Result<(), SignatureError> {
        let computed = blake3_hash(message);
        if computed != *digest {
            return Err(SignatureError::DigestMismatch {
                computed,
                claimed: *digest,
            });
        }

        let public_key = address.public_key()?;
        if public_key.verify(digest.as_bytes(), signature) {
            Ok(())
        } else {
            Err(SignatureError::VerificationFailed {
                address: address.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let signer = Ed25519Signer::generate();
        let (digest, signature) = signer.sign(b"ledger entry");
        Ed25519Verifier
            .verify(b"ledger entry", &signature, &digest, &signer.address())
            .unwrap();
    }

    #[test]
    fn digest_mismatch_detected() {
        let signer = Ed25519Signer::generate();
        let (digest, signature) = signer.sign(b"ledger entry");
        let err = Ed25519Verifier
            .verify(b"ledger entry (edited)", &signature, &digest, &signer.address())
            .unwrap_err();
        assert!(matches!(err, SignatureError::DigestMismatch { .. }));
    }

    #[test]
    fn wrong_address_rejected() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let (digest, signature) = signer.sign(b"ledger entry");
        let err = Ed25519Verifier
            .verify(b"ledger entry", &signature, &digest, &other.address())
            .unwrap_err();
        assert!(matches!(err, SignatureError::VerificationFailed { .. }));
    }

    #[test]
    fn malformed_address_rejected() {
        let signer = Ed25519Signer::generate();
        let (digest, signature) = signer.sign(b"x");
        let bogus: Address = serde_json::from_str("\"acct1notanaddress\"").unwrap();
        let err = Ed25519Verifier
            .verify(b"x", &signature, &digest, &bogus)
            .unwrap_err();
        assert!(matches!(err, SignatureError::InvalidAddress(_)));
    }
}
