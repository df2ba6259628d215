//! # LedgerDB - Persistent Vertex Store
//!
//! The persistence layer for the DAG ledger, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key              | Value            |
//! |------------|------------------|------------------|
//! | `vertices` | `hash` (32B)     | `bincode(Vertex)`|
//! | `sequence` | `seq` (u64, BE)  | `hash` (32B)     |
//! | `metadata` | key (UTF-8)      | value (bytes)    |
//!
//! ## Write-once
//!
//! Vertex keys are written at most once. Each insert is a multi-tree
//! transaction that checks the key is absent, stores the record and appends
//! its hash to `sequence`, so two racing writers of the same hash cannot
//! both succeed and no reader ever sees a partial record. The genesis
//! vertex additionally records its metadata marker in the same transaction.
//!
//! ## Insertion order
//!
//! `sequence` keys come from [`sled::Db::generate_id`], which is monotonic
//! across restarts. [`LedgerDB::vertices`] walks that tree, so vertices come
//! back in the order they were committed.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crate::crypto::Hash32;
use crate::ledger::Vertex;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted record: {0}")]
    Corrupted(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_GENESIS: &[u8] = b"genesis_hash";
const META_FRONTIER: &[u8] = b"frontier";

// ---------------------------------------------------------------------------
// LedgerDB
// ---------------------------------------------------------------------------

/// Persistent store for ledger vertices and node metadata.
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// a `LedgerDB` can be cloned and shared freely.
#[derive(Debug, Clone)]
pub struct LedgerDB {
    db: Db,
    vertices: Tree,
    sequence: Tree,
    metadata: Tree,
}

impl LedgerDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database, removed when dropped. Used by ephemeral nodes
    /// and tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let vertices = db.open_tree("vertices")?;
        let sequence = db.open_tree("sequence")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            vertices,
            sequence,
            metadata,
        })
    }

    // -- Vertex operations --------------------------------------------------

    /// Stores a vertex under its hash if the key is absent.
    ///
    /// Returns `false` (and writes nothing) when the hash already exists.
    pub fn insert_vertex(&self, vertex: &Vertex) -> DbResult<bool> {
        let bytes = encode(vertex)?;
        let key = vertex.hash.as_bytes();
        let seq = self.db.generate_id()?.to_be_bytes();

        let result = (&self.vertices, &self.sequence).transaction(|(vertices, sequence)| {
            if vertices.get(key)?.is_some() {
                return Ok(false);
            }
            vertices.insert(&key[..], bytes.clone())?;
            sequence.insert(&seq[..], &key[..])?;
            Ok::<bool, ConflictableTransactionError<()>>(true)
        });
        settle(result)
    }

    /// Stores the genesis vertex and records its hash, atomically.
    ///
    /// Returns `false` if a genesis is already recorded or the hash exists.
    pub fn insert_genesis(&self, vertex: &Vertex) -> DbResult<bool> {
        let bytes = encode(vertex)?;
        let key = vertex.hash.as_bytes();
        let seq = self.db.generate_id()?.to_be_bytes();

        let result = (&self.vertices, &self.sequence, &self.metadata).transaction(
            |(vertices, sequence, metadata)| {
                if metadata.get(META_GENESIS)?.is_some() || vertices.get(key)?.is_some() {
                    return Ok(false);
                }
                vertices.insert(&key[..], bytes.clone())?;
                sequence.insert(&seq[..], &key[..])?;
                metadata.insert(META_GENESIS, &key[..])?;
                Ok::<bool, ConflictableTransactionError<()>>(true)
            },
        );
        settle(result)
    }

    pub fn get_vertex(&self, hash: &Hash32) -> DbResult<Option<Vertex>> {
        match self.vertices.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains_vertex(&self, hash: &Hash32) -> DbResult<bool> {
        Ok(self.vertices.contains_key(hash.as_bytes())?)
    }

    /// Every stored vertex, in insertion order.
    pub fn vertices(&self) -> DbResult<Vec<Vertex>> {
        let mut out = Vec::with_capacity(self.vertices.len());
        for entry in self.sequence.iter() {
            let (_seq, hash) = entry?;
            let hash = Hash32::try_from_slice(&hash)
                .ok_or_else(|| DbError::Corrupted("sequence entry length".into()))?;
            let vertex = self
                .get_vertex(&hash)?
                .ok_or_else(|| DbError::Corrupted(format!("sequence names missing vertex {hash}")))?;
            out.push(vertex);
        }
        Ok(out)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    // -- Metadata -----------------------------------------------------------

    pub fn genesis_hash(&self) -> DbResult<Option<Hash32>> {
        match self.metadata.get(META_GENESIS)? {
            Some(bytes) => Hash32::try_from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| DbError::Corrupted("genesis hash length".into())),
            None => Ok(None),
        }
    }

    /// Persists the frontier pair as `last ‖ one_before_last`.
    pub fn put_frontier(&self, last: &Hash32, one_before_last: &Hash32) -> DbResult<()> {
        let mut value = Vec::with_capacity(64);
        value.extend_from_slice(last.as_bytes());
        value.extend_from_slice(one_before_last.as_bytes());
        self.metadata.insert(META_FRONTIER, value)?;
        Ok(())
    }

    pub fn get_frontier(&self) -> DbResult<Option<(Hash32, Hash32)>> {
        let Some(bytes) = self.metadata.get(META_FRONTIER)? else {
            return Ok(None);
        };
        if bytes.len() != 64 {
            return Err(DbError::Corrupted(format!(
                "frontier record is {} bytes",
                bytes.len()
            )));
        }
        let last = Hash32::try_from_slice(&bytes[..32]);
        let before = Hash32::try_from_slice(&bytes[32..]);
        match (last, before) {
            (Some(last), Some(before)) => Ok(Some((last, before))),
            _ => Err(DbError::Corrupted("frontier record".into())),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn settle(result: Result<bool, TransactionError<()>>) -> DbResult<bool> {
    match result {
        Ok(inserted) => Ok(inserted),
        Err(TransactionError::Storage(e)) => Err(DbError::Sled(e)),
        Err(TransactionError::Abort(())) => Ok(false),
    }
}

fn encode(vertex: &Vertex) -> DbResult<Vec<u8>> {
    bincode::serialize(vertex).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> DbResult<Vertex> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
