//! # Cryptographic Primitives
//!
//! Everything security-related flows through here:
//!
//! - **Ed25519** for signatures (`keys`, `signatures`).
//! - **BLAKE3** for every hash in the ledger (`hash`).
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. The [`Signer`] and [`Verifier`] traits are the seams the
//! ledger depends on.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, blake3_hash_multi, Hash32};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{Ed25519Signer, Ed25519Verifier, SignatureError, Signer, Verifier};
