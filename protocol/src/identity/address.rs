//! # Account Addresses
//!
//! An [`Address`] is the Bech32 encoding of a raw Ed25519 public key with
//! the `acct` human-readable prefix. Because the full key is embedded, a
//! verifier can check a signature against an address without any key
//! directory lookup.
//!
//! ```text
//! acct1<bech32(public key bytes)><checksum>
//! ```

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::ADDRESS_HRP;
use crate::crypto::keys::PublicKey;

/// Errors from parsing or decoding an address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    #[error("bech32 encode error: {0}")]
    Bech32Encode(String),

    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp { expected: String, got: String },

    #[error("address does not carry a valid Ed25519 public key")]
    InvalidPublicKey,
}

/// A checksummed account address.
///
/// Serialized as the plain address string. Addresses deserialized from
/// untrusted input are only checked when [`Address::public_key`] is
/// called, which every verification path does.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derives the address of a public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        // Encoding 32 bytes under a static, valid HRP cannot fail; the
        // fallback keeps the function total without a panic path.
        Self::encode(pk.as_bytes()).unwrap_or_else(|_| Self(hex::encode(pk.as_bytes())))
    }

    fn encode(data: &[u8]) -> Result<Self, AddressError> {
        let hrp = Hrp::parse(ADDRESS_HRP).map_err(|e| AddressError::Bech32Encode(e.to_string()))?;
        bech32::encode::<Bech32>(hrp, data)
            .map(Self)
            .map_err(|e| AddressError::Bech32Encode(e.to_string()))
    }

    /// Parses and fully validates an address string.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let address = Self(s.to_string());
        address.public_key()?;
        Ok(address)
    }

    /// Decodes the public key embedded in this address.
    pub fn public_key(&self) -> Result<PublicKey, AddressError> {
        let (hrp, data) =
            bech32::decode(&self.0).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;
        let expected = Hrp::parse(ADDRESS_HRP).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;
        if hrp != expected {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }
        PublicKey::try_from_slice(&data).map_err(|_| AddressError::InvalidPublicKey)
    }

    /// The address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn address_starts_with_hrp() {
        let kp = Keypair::generate();
        let address = Address::from_public_key(&kp.public_key());
        assert!(address.as_str().starts_with("acct1"));
    }

    #[test]
    fn address_recovers_public_key() {
        let kp = Keypair::generate();
        let address = Address::from_public_key(&kp.public_key());
        assert_eq!(address.public_key().unwrap(), kp.public_key());
        assert_eq!(Address::parse(address.as_str()).unwrap(), address);
    }

    #[test]
    fn different_keys_different_addresses() {
        let a = Address::from_public_key(&Keypair::generate().public_key());
        let b = Address::from_public_key(&Keypair::generate().public_key());
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_hrp_rejected() {
        let kp = Keypair::generate();
        let hrp = Hrp::parse("btc").unwrap();
        let foreign = bech32::encode::<Bech32>(hrp, kp.public_key().as_bytes()).unwrap();
        assert!(matches!(
            Address::parse(&foreign),
            Err(AddressError::InvalidHrp { .. })
        ));
    }

    #[test]
    fn corrupted_address_rejected() {
        let kp = Keypair::generate();
        let mut s = Address::from_public_key(&kp.public_key()).to_string();
        let last = s.pop().unwrap();
        s.push(if last == 'q' { 'p' } else { 'q' });
        assert!(Address::parse(&s).is_err());
    }

    #[test]
    fn serde_is_plain_string() {
        let kp = Keypair::generate();
        let address = Address::from_public_key(&kp.public_key());
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
    }
}
