//! # Gossip Protocol
//!
//! Epidemic broadcast of payload identifiers (vertex hashes). Every
//! message carries a knowledge set: the nodes the carrier believes already
//! hold the payload. A node relays only to peers outside that set.
//!
//! ## Receive rule
//!
//! 1. Payload already seen **and** this node already in the knowledge set:
//!    drop.
//! 2. Otherwise add this node to the knowledge set, record the payload as
//!    seen and relay the augmented message to every peer not in the set.
//!
//! An unseen payload is first handed to a delivery callback (the ledger).
//! If delivery fails the payload is neither marked seen nor relayed, so a
//! later copy gets another chance.
//!
//! ## Deduplication cache
//!
//! The seen set is bounded. Once it exceeds its capacity the oldest
//! entries are evicted until it is back at 75% capacity. A payload evicted
//! and received again is treated as new; the ledger below is idempotent.
//!
//! This module does no I/O. [`GossipProtocol::handle_message`] returns a
//! [`GossipAction`] which the node runtime ([`super::node`]) executes.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::config::{
    DEFAULT_INBOX_CAPACITY, DEFAULT_SEEN_CACHE_CAPACITY, SEEN_CACHE_LOW_WATERMARK_PERCENT,
};
use crate::crypto::Hash32;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-node gossip settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Capacity of the bounded inbound queue. A relay into a full queue
    /// waits for room.
    pub inbox_capacity: usize,
    /// Maximum number of payload hashes kept in the seen cache.
    pub seen_cache_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            seen_cache_capacity: DEFAULT_SEEN_CACHE_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GossipError {
    /// Undecodable wire frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The node's task has stopped.
    #[error("node {0} is closed")]
    Closed(NodeId),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

// ---------------------------------------------------------------------------
// Node identity and knowledge sets
// ---------------------------------------------------------------------------

/// Opaque node identity: an index into the node registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Nodes known to hold a payload.
///
/// Shared behind an `Arc`: relaying one message to many peers clones a
/// pointer, and a new set is allocated only when a hop adds itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeSet<NodeId>", into = "BTreeSet<NodeId>")]
pub struct KnowledgeSet(Arc<BTreeSet<NodeId>>);

impl KnowledgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The set plus `id`. Shares the existing allocation if `id` is
    /// already present.
    pub fn with(&self, id: NodeId) -> Self {
        if self.contains(&id) {
            return self.clone();
        }
        let mut next = (*self.0).clone();
        next.insert(id);
        Self(Arc::new(next))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }
}

impl From<BTreeSet<NodeId>> for KnowledgeSet {
    fn from(set: BTreeSet<NodeId>) -> Self {
        Self(Arc::new(set))
    }
}

impl From<KnowledgeSet> for BTreeSet<NodeId> {
    fn from(set: KnowledgeSet) -> Self {
        Arc::try_unwrap(set.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

// ---------------------------------------------------------------------------
// Messages and actions
// ---------------------------------------------------------------------------

/// `{ payload, knowledge }`: the only message the protocol exchanges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub payload: Hash32,
    pub knowledge: KnowledgeSet,
}

impl GossipMessage {
    /// A fresh announcement with an empty knowledge set.
    pub fn new(payload: Hash32) -> Self {
        Self {
            payload,
            knowledge: KnowledgeSet::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, GossipError> {
        bincode::serialize(self).map_err(|e| GossipError::Protocol(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, GossipError> {
        bincode::deserialize(bytes).map_err(|e| GossipError::Protocol(e.to_string()))
    }
}

/// What the runtime should do after a message is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipAction {
    /// Duplicate; nothing to do.
    Drop,
    /// Send `message` to each of `targets`. `targets` may be empty when
    /// every peer is already in the knowledge set.
    Relay {
        message: GossipMessage,
        targets: Vec<NodeId>,
    },
}

// ---------------------------------------------------------------------------
// Seen cache
// ---------------------------------------------------------------------------

/// Bounded set of seen payloads with oldest-first eviction.
#[derive(Debug)]
pub struct SeenCache {
    entries: HashMap<Hash32, u64>,
    capacity: usize,
    sequence: u64,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            sequence: 0,
        }
    }

    pub fn contains(&self, payload: &Hash32) -> bool {
        self.entries.contains_key(payload)
    }

    /// Records `payload`. Returns `true` if it was not present.
    pub fn insert(&mut self, payload: Hash32) -> bool {
        if self.entries.contains_key(&payload) {
            return false;
        }
        self.sequence += 1;
        self.entries.insert(payload, self.sequence);
        self.maybe_evict();
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn payloads(&self) -> impl Iterator<Item = &Hash32> {
        self.entries.keys()
    }

    fn maybe_evict(&mut self) {
        if self.entries.len() <= self.capacity {
            return;
        }

        let target = self.capacity * SEEN_CACHE_LOW_WATERMARK_PERCENT / 100;
        let mut entries: Vec<(Hash32, u64)> =
            self.entries.iter().map(|(hash, seq)| (*hash, *seq)).collect();
        entries.sort_by_key(|(_, seq)| *seq);

        let to_remove = entries.len().saturating_sub(target);
        for (hash, _) in entries.iter().take(to_remove) {
            self.entries.remove(hash);
        }
        trace!(evicted = to_remove, "seen cache trimmed");
    }
}

// ---------------------------------------------------------------------------
// Gossip Protocol
// ---------------------------------------------------------------------------

/// Per-node protocol state: identity, peers and the seen cache.
#[derive(Debug)]
pub struct GossipProtocol {
    id: NodeId,
    peers: BTreeSet<NodeId>,
    seen: SeenCache,
}

impl GossipProtocol {
    pub fn new(id: NodeId, config: &GossipConfig) -> Self {
        Self {
            id,
            peers: BTreeSet::new(),
            seen: SeenCache::new(config.seen_cache_capacity),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Applies the receive rule to `message`.
    ///
    /// `deliver` runs only for payloads not yet seen. Its error aborts the
    /// handling: nothing is recorded and nothing is relayed.
    pub fn handle_message<E, F>(
        &mut self,
        message: GossipMessage,
        deliver: F,
    ) -> Result<GossipAction, E>
    where
        F: FnOnce(&Hash32) -> Result<(), E>,
    {
        let seen = self.seen.contains(&message.payload);
        if seen && message.knowledge.contains(&self.id) {
            trace!(node = %self.id, payload = %message.payload, "dropping duplicate gossip");
            return Ok(GossipAction::Drop);
        }

        if !seen {
            deliver(&message.payload)?;
        }

        let knowledge = message.knowledge.with(self.id);
        self.seen.insert(message.payload);

        let targets = self
            .peers
            .iter()
            .filter(|peer| !knowledge.contains(peer))
            .copied()
            .collect();

        Ok(GossipAction::Relay {
            message: GossipMessage {
                payload: message.payload,
                knowledge,
            },
            targets,
        })
    }

    /// Registers a peer. Self-connections are ignored.
    pub fn add_peer(&mut self, peer: NodeId) -> bool {
        peer != self.id && self.peers.insert(peer)
    }

    pub fn remove_peer(&mut self, peer: &NodeId) -> bool {
        self.peers.remove(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeId> {
        self.peers.iter()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn has_seen(&self, payload: &Hash32) -> bool {
        self.seen.contains(payload)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn seen_payloads(&self) -> impl Iterator<Item = &Hash32> {
        self.seen.payloads()
    }
}
