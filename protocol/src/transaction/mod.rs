//! # Transaction Module
//!
//! Construction, dual signing and verification of the transfers that ledger
//! vertices wrap.
//!
//! ## Architecture
//!
//! ```text
//! spice.rs        - Spice amounts with checked carry/borrow arithmetic
//! builder.rs      - Transaction and its fluent TransactionBuilder
//! signing.rs      - Issuer and receiver signatures through the Signer trait
//! verification.rs - Size, timestamp, hash and signature checks
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** with [`TransactionBuilder`]; the content hash is computed.
//! 2. **Sign** with [`sign_as_issuer`], then co-sign with [`sign_as_receiver`].
//! 3. **Verify** with [`verify_transaction`] before a vertex is built
//!    around it and whenever a vertex is validated.

pub mod builder;
pub mod signing;
pub mod spice;
pub mod verification;

pub use builder::{now_nanos, Transaction, TransactionBuilder};
pub use signing::{sign_as_issuer, sign_as_receiver};
pub use spice::{Spice, SpiceError};
pub use verification::{verify_transaction, TransactionError};
