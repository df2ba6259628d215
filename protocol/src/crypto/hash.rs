//! # Hashing Utilities
//!
//! BLAKE3 is the only hash function in the ledger. Transaction hashes,
//! vertex hashes and gossip payload identifiers are all 32-byte BLAKE3
//! digests wrapped in [`Hash32`].
//!
//! The all-zero value is reserved: it marks "no parent" on the genesis
//! vertex and "nothing authored yet" in the frontier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::HASH_OUTPUT_LENGTH;

/// A 32-byte BLAKE3 digest.
///
/// Ordered so it can key `BTreeMap`s and tie-break topological replay
/// deterministically.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash32([u8; HASH_OUTPUT_LENGTH]);

impl Hash32 {
    /// The all-zero hash. Used as the parent of genesis.
    pub const ZERO: Hash32 = Hash32([0u8; HASH_OUTPUT_LENGTH]);

    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; HASH_OUTPUT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Tries to build a hash from a slice. Returns `None` on wrong length.
    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; HASH_OUTPUT_LENGTH] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.0
    }

    /// `true` for the reserved all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_OUTPUT_LENGTH]
    }

    /// Hex-encoded representation. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded hash.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::try_from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", &self.to_hex()[..16])
    }
}

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use accountant_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"accountant");
/// assert!(!hash.is_zero());
/// ```
pub fn blake3_hash(data: &[u8]) -> Hash32 {
    Hash32(*blake3::hash(data).as_bytes())
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Equivalent to hashing the concatenation of `parts`; no separators are
/// inserted, so callers that need field boundaries must add them.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    Hash32(*hasher.finalize().as_bytes())
}
