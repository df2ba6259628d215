//! # Storage Module
//!
//! Persistence for the DAG ledger. The store is the single source of truth
//! for a node: vertices are keyed by their 32-byte hash and written at most
//! once, and a small metadata tree carries the genesis marker and the
//! node's frontier.
//!
//! Bincode for on-disk serialization: compact, fast, deterministic.

pub mod db;

pub use db::{DbError, DbResult, LedgerDB};
