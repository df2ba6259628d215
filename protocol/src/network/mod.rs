//! # Network Module
//!
//! Epidemic dissemination of vertex hashes between ledger nodes, and the
//! replication glue that turns a newly seen hash into a committed vertex.
//!
//! ## Architecture
//!
//! ```text
//! gossip.rs      - Receive rule, knowledge sets, seen cache, wire codec
//! node.rs        - Per-node tokio task draining a bounded inbox
//! registry.rs    - Arena of nodes: spawn, connect, quiescence, shutdown
//! replication.rs - PayloadSink / VertexSource and the LedgerReplicator
//! ```
//!
//! ## Design Decisions
//!
//! - Nodes are identified by an opaque [`NodeId`] indexing the registry
//!   arena, never by pointer identity.
//! - Relays wait for room in a full peer inbox instead of dropping. No
//!   message is lost to backpressure, at the price of possible mutual
//!   waiting between saturated nodes.
//! - The protocol layer is transport-agnostic: messages travel over tokio
//!   channels in-process, and [`GossipMessage::encode`] gives the framing
//!   for any byte transport.

pub mod gossip;
pub mod node;
pub mod registry;
pub mod replication;

pub use gossip::{
    GossipAction, GossipConfig, GossipError, GossipMessage, GossipProtocol, KnowledgeSet, NodeId,
    SeenCache,
};
pub use node::{GossipHandle, GossipNode, Inbound, NodeSnapshot};
pub use registry::NodeRegistry;
pub use replication::{LedgerReplicator, NullSink, PayloadSink, VertexDirectory, VertexSource};
