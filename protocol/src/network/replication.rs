//! Ledger replication on top of gossip.
//!
//! Gossip carries only vertex hashes. When a node sees a hash for the
//! first time it hands it to its [`PayloadSink`]; the [`LedgerReplicator`]
//! sink fetches the vertex from a [`VertexSource`], pulls in any ancestors
//! the local store lacks (parents first, so the closure rule holds) and
//! commits each through [`AccountingBook::accept_remote`].
//!
//! Parent links only say what a vertex was built on, not where its issuer's
//! money came from. A spend can therefore arrive before the credit that
//! funds it. Such a vertex is valid but underfunded here; the replicator
//! parks it and retries the pool after every commit, so it lands as soon as
//! the credit does.
//!
//! A sink error tells the gossip layer not to mark the hash seen and not to
//! relay it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::gossip::NodeId;
use crate::config::DEFAULT_PENDING_CAPACITY;
use crate::crypto::Hash32;
use crate::ledger::{AccountingBook, LedgerError, LedgerResult, Vertex};

/// Consumer of newly seen payload hashes.
///
/// `accept` is synchronous and may block on storage. The gossip node runs
/// it through `tokio::task::block_in_place` on multi-threaded runtimes;
/// on a current-thread runtime it runs inline and stalls that thread for
/// the duration of the call.
pub trait PayloadSink: Send + Sync {
    fn accept(&self, payload: &Hash32) -> Result<(), LedgerError>;
}

/// Accepts everything. For gossip-only clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PayloadSink for NullSink {
    fn accept(&self, _payload: &Hash32) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Where a node fetches vertices it has only heard the hash of.
pub trait VertexSource: Send + Sync {
    fn fetch(&self, hash: &Hash32) -> LedgerResult<Option<Vertex>>;
}

impl VertexSource for AccountingBook {
    fn fetch(&self, hash: &Hash32) -> LedgerResult<Option<Vertex>> {
        match self.get_vertex(hash) {
            Ok(vertex) => Ok(Some(vertex)),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-process directory of every node's book, standing in for a
/// request/response transport between peers.
#[derive(Debug, Default)]
pub struct VertexDirectory {
    books: DashMap<NodeId, Arc<AccountingBook>>,
}

impl VertexDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: NodeId, book: Arc<AccountingBook>) {
        self.books.insert(id, book);
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<AccountingBook>> {
        self.books.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl VertexSource for VertexDirectory {
    fn fetch(&self, hash: &Hash32) -> LedgerResult<Option<Vertex>> {
        for entry in self.books.iter() {
            if let Some(vertex) = entry.value().fetch(hash)? {
                return Ok(Some(vertex));
            }
        }
        Ok(None)
    }
}

/// Vertices that cannot be stored yet, oldest first.
#[derive(Debug, Default)]
struct PendingPool {
    by_age: BTreeMap<(i64, Hash32), Vertex>,
    ages: HashMap<Hash32, i64>,
}

impl PendingPool {
    fn insert(&mut self, vertex: Vertex) {
        self.ages.insert(vertex.hash, vertex.created_at);
        self.by_age.insert((vertex.created_at, vertex.hash), vertex);
    }

    fn remove(&mut self, hash: &Hash32) {
        if let Some(age) = self.ages.remove(hash) {
            self.by_age.remove(&(age, *hash));
        }
    }

    fn pop_oldest(&mut self) -> Option<Vertex> {
        let (_, vertex) = self.by_age.pop_first()?;
        self.ages.remove(&vertex.hash);
        Some(vertex)
    }

    fn contains(&self, hash: &Hash32) -> bool {
        self.ages.contains_key(hash)
    }

    fn len(&self) -> usize {
        self.ages.len()
    }
}

/// Result of one commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Stored,
    Known,
    /// Underfunded, or a parent is itself waiting.
    Waiting,
}

/// [`PayloadSink`] that replicates vertices into a local book.
pub struct LedgerReplicator {
    book: Arc<AccountingBook>,
    source: Arc<dyn VertexSource>,
    pending: Mutex<PendingPool>,
    pending_capacity: usize,
}

impl LedgerReplicator {
    pub fn new(book: Arc<AccountingBook>, source: Arc<dyn VertexSource>) -> Self {
        Self::with_pending_capacity(book, source, DEFAULT_PENDING_CAPACITY)
    }

    pub fn with_pending_capacity(
        book: Arc<AccountingBook>,
        source: Arc<dyn VertexSource>,
        pending_capacity: usize,
    ) -> Self {
        Self {
            book,
            source,
            pending: Mutex::new(PendingPool::default()),
            pending_capacity: pending_capacity.max(1),
        }
    }

    /// Number of vertices waiting for funds or for a waiting parent.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, hash: &Hash32) -> bool {
        self.pending.lock().contains(hash)
    }

    fn fetch(&self, hash: &Hash32) -> LedgerResult<Vertex> {
        let vertex = self
            .source
            .fetch(hash)?
            .ok_or_else(|| LedgerError::NotFound(format!("vertex {hash} unavailable")))?;
        if vertex.hash != *hash {
            return Err(LedgerError::Protocol(format!(
                "asked for {hash}, source returned {}",
                vertex.hash
            )));
        }
        Ok(vertex)
    }

    fn try_commit(&self, vertex: &Vertex) -> LedgerResult<Commit> {
        match self.book.accept_remote(vertex) {
            Ok(true) => {
                debug!(vertex = %vertex.hash, "replicated vertex");
                Ok(Commit::Stored)
            }
            Ok(false) => Ok(Commit::Known),
            Err(LedgerError::Conflict(_)) if self.book.is_underfunded(vertex) => Ok(Commit::Waiting),
            Err(LedgerError::NotFound(reason)) => {
                for parent in vertex.parents() {
                    if !self.book.contains(&parent)? && !self.is_pending(&parent) {
                        return Err(LedgerError::NotFound(reason));
                    }
                }
                Ok(Commit::Waiting)
            }
            Err(e) => Err(e),
        }
    }

    fn park(&self, vertex: Vertex) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.pending_capacity {
            if let Some(evicted) = pending.pop_oldest() {
                warn!(vertex = %evicted.hash, "pending pool full, dropping oldest");
            }
        }
        debug!(vertex = %vertex.hash, issuer = %vertex.issuer, "vertex parked");
        pending.insert(vertex);
    }

    /// Retries parked vertices, oldest first, until a pass stores nothing.
    fn drain_pending(&self) -> LedgerResult<()> {
        loop {
            let parked: Vec<Vertex> = self.pending.lock().by_age.values().cloned().collect();
            let mut progress = false;

            for vertex in parked {
                match self.try_commit(&vertex) {
                    Ok(Commit::Waiting) => continue,
                    Ok(outcome) => progress |= outcome == Commit::Stored,
                    Err(e) if e.is_io() => return Err(e),
                    Err(e) => warn!(vertex = %vertex.hash, error = %e, "dropping parked vertex"),
                }
                self.pending.lock().remove(&vertex.hash);
            }
            if !progress {
                return Ok(());
            }
        }
    }
}

impl PayloadSink for LedgerReplicator {
    /// Stores `payload` and any missing ancestors. A vertex that has to
    /// wait is parked and still reported as accepted, so gossip carries it
    /// on to peers that may be able to store it.
    fn accept(&self, payload: &Hash32) -> Result<(), LedgerError> {
        if self.book.contains(payload)? || self.is_pending(payload) {
            return Ok(());
        }

        // Iterative post-order walk: a vertex is committed only after the
        // entries pushed above it (its missing parents) are done.
        let mut stack = vec![(*payload, false)];
        let mut fetched: HashMap<Hash32, Vertex> = HashMap::new();
        let mut stored = false;

        while let Some((hash, expanded)) = stack.pop() {
            if self.book.contains(&hash)? || self.is_pending(&hash) {
                continue;
            }
            if expanded {
                let Some(vertex) = fetched.remove(&hash) else {
                    continue;
                };
                match self.try_commit(&vertex)? {
                    Commit::Stored => stored = true,
                    Commit::Known => {}
                    Commit::Waiting => self.park(vertex),
                }
                continue;
            }

            let vertex = self.fetch(&hash)?;
            stack.push((hash, true));
            for parent in vertex.parents() {
                if !self.book.contains(&parent)? && !self.is_pending(&parent) {
                    stack.push((parent, false));
                }
            }
            fetched.insert(hash, vertex);
        }

        if stored {
            self.drain_pending()?;
        }
        Ok(())
    }
}
