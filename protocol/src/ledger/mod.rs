//! # DAG Ledger
//!
//! Signed vertices, each wrapping one transaction and naming two parents,
//! stored write-once and folded into per-address balances.
//!
//! ```text
//! error.rs    - LedgerError taxonomy
//! vertex.rs   - Vertex construction, digest and validation
//! frontier.rs - Last two self-authored hashes (default parents)
//! balance.rs  - Derived balances with the double-spend guard
//! replay.rs   - Kahn topological replay of the stored DAG
//! book.rs     - AccountingBook, the entry point tying it together
//! ```
//!
//! The only cross-node ordering guarantee is causal: any node holding a
//! vertex already holds both of its parents.

pub mod balance;
pub mod book;
pub mod error;
pub mod frontier;
pub mod replay;
pub mod vertex;

pub use balance::{Balance, BalanceLedger};
pub use book::{AccountingBook, AuditReport};
pub use error::{LedgerError, LedgerResult};
pub use frontier::Frontier;
pub use replay::{replay_balances, ReplayReport};
pub use vertex::{vertex_digest, Vertex};
