//! # Identity Module
//!
//! Every participant is identified by an Ed25519 keypair (see
//! [`crate::crypto::keys`]). The identity that appears in transactions and
//! vertices is the [`Address`]: a Bech32 string with the `acct` prefix that
//! embeds the public key, so signatures can be checked from the address
//! alone.

pub mod address;

pub use address::{Address, AddressError};
