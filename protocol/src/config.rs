//! # Protocol Configuration & Constants
//!
//! Every magic number the ledger and the gossip layer depend on lives here.
//! Values that are part of the signed byte formats (the address HRP, the
//! digest separator, the Spice scale) cannot change without invalidating
//! every stored vertex, so treat them as frozen.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the ledger format.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte mixed into the transaction signable bytes. Bump on any
/// change to the canonical byte layout.
pub const TRANSACTION_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Identity & Hashing
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for account addresses (`acct1...`).
pub const ADDRESS_HRP: &str = "acct";

/// Hash output length in bytes. BLAKE3 produces 32-byte digests.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Separator placed between the fields of a vertex digest.
pub const DIGEST_SEPARATOR: u8 = b'|';

// ---------------------------------------------------------------------------
// Spice
// ---------------------------------------------------------------------------

/// Number of supplementary sub-units in one primary Spice unit (10^18).
/// Fits comfortably in a `u64` (max ~1.8 * 10^19).
pub const SUPPLEMENTARY_PER_CURRENCY: u64 = 1_000_000_000_000_000_000;

/// Decimal places used when rendering the supplementary sub-unit.
pub const SUPPLEMENTARY_DECIMALS: usize = 18;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum length of a transaction subject, in bytes.
pub const MAX_SUBJECT_LENGTH: usize = 256;

/// Maximum size of the opaque transaction data payload, in bytes.
pub const MAX_TRANSACTION_DATA_BYTES: usize = 15 * 1024;

/// Transactions created more than this many seconds in the future are
/// rejected. Guards against clock skew without rejecting honest peers.
pub const MAX_FUTURE_SECONDS: i64 = 300;

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// Default capacity of a node's inbound gossip queue. Relaying into a full
/// queue blocks the sender.
pub const DEFAULT_INBOX_CAPACITY: usize = 4_096;

/// Default number of payload identifiers kept in a node's seen cache
/// before the oldest entries are evicted.
pub const DEFAULT_SEEN_CACHE_CAPACITY: usize = 100_000;

/// Eviction trims the seen cache down to this fraction (in percent) of
/// its capacity.
pub const SEEN_CACHE_LOW_WATERMARK_PERCENT: usize = 75;

/// Vertices a replicator holds while their issuer's funding has not
/// arrived yet. The oldest is dropped when full.
pub const DEFAULT_PENDING_CAPACITY: usize = 10_000;

/// Poll interval used while waiting for a cluster to quiesce.
pub const QUIESCENCE_POLL_INTERVAL_MS: u64 = 5;
