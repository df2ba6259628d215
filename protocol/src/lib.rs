// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Accountant Protocol - Core Library
//!
//! A peer-replicated transaction ledger. Each node binds dual-signed
//! transactions into a DAG of signed vertices, keeps a derived balance view
//! with a double-spend guard, and spreads new vertices to every other node
//! through an epidemic broadcast until all nodes know the same set.
//!
//! ## Architecture
//!
//! - **config** - Protocol constants: address prefix, digest separator,
//!   Spice scale, size limits, gossip defaults.
//! - **crypto** - BLAKE3 hashing, Ed25519 keys, the `Signer`/`Verifier` seams.
//! - **identity** - Bech32 account addresses that embed the public key.
//! - **transaction** - Spice amounts, transaction building, dual signing and
//!   verification.
//! - **storage** - sled-backed write-once vertex store.
//! - **ledger** - Vertices, frontier, balances, topological replay and the
//!   `AccountingBook` that ties them together.
//! - **network** - Gossip protocol, per-node tasks, registry and ledger
//!   replication.
//!
//! ## Guarantees
//!
//! 1. No vertex is stored before both of its parents.
//! 2. No vertex is stored if applying it would overdraw its issuer.
//! 3. A signed transaction moves funds at most once, however many vertices
//!    wrap it.
//! 4. Balances always equal a topological replay of the stored DAG.
//! 5. Every node eventually sees every payload in a connected cluster.
//!    There is no global total order beyond parent links.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;
pub mod network;
pub mod storage;
pub mod transaction;
