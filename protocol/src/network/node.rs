//! # Gossip Node
//!
//! One tokio task per node. The task owns a [`GossipProtocol`] and drains a
//! bounded inbox strictly in order, so relay decisions for a node are
//! serialized without any lock.
//!
//! ```text
//! GossipHandle ──▶ [bounded inbox] ──▶ GossipNode::run ──▶ PayloadSink (ledger)
//!                                            │
//!                                            └──▶ peer inboxes (send().await)
//! ```
//!
//! Relaying into a full peer inbox waits for room rather than dropping the
//! message. Nodes relaying to each other through full inboxes can wait on
//! each other forever, so size `inbox_capacity` for the expected burst.
//! Every wait also watches the shutdown signal.
//!
//! Each enqueued message bumps a counter shared by the whole cluster and
//! the counter drops once the message (and the enqueueing of its relays)
//! is done. A counter at zero means the cluster is quiescent.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::gossip::{GossipAction, GossipConfig, GossipError, GossipMessage, GossipProtocol, NodeId};
use super::replication::PayloadSink;
use crate::crypto::Hash32;

/// Runs a synchronous sink call. On a multi-threaded runtime the worker
/// hands its other tasks off first; a current-thread runtime has nowhere
/// to hand them, so the call runs inline.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Inbox entries.
#[derive(Debug)]
pub enum Inbound {
    Gossip(GossipMessage),
    /// An encoded [`GossipMessage`] straight off a transport.
    Wire(Vec<u8>),
    /// A payload produced locally; not handed to the sink.
    Originate(Hash32),
    Connect {
        peer: NodeId,
        sender: mpsc::Sender<Inbound>,
    },
    Snapshot(oneshot::Sender<NodeSnapshot>),
}

/// Point-in-time view of a node's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub seen: BTreeSet<Hash32>,
    pub peers: Vec<NodeId>,
    /// Messages handled (delivered or relayed on).
    pub processed: u64,
    /// Relays enqueued to peers.
    pub relayed: u64,
    /// Duplicates dropped.
    pub dropped: u64,
    /// Payloads the sink refused, plus undecodable frames.
    pub rejected: u64,
}

impl NodeSnapshot {
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[derive(Debug, Default)]
struct NodeStats {
    processed: u64,
    relayed: u64,
    dropped: u64,
    rejected: u64,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sender side of a node.
#[derive(Debug, Clone)]
pub struct GossipHandle {
    id: NodeId,
    sender: mpsc::Sender<Inbound>,
    in_flight: Arc<AtomicUsize>,
}

impl GossipHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Delivers a gossip message as if it came from a peer.
    pub async fn receive(&self, message: GossipMessage) -> Result<(), GossipError> {
        self.enqueue(Inbound::Gossip(message)).await
    }

    /// Decodes and delivers a wire frame. Malformed frames are dropped by
    /// the node with a warning.
    pub async fn receive_bytes(&self, bytes: Vec<u8>) -> Result<(), GossipError> {
        self.enqueue(Inbound::Wire(bytes)).await
    }

    /// Starts dissemination of a locally produced payload.
    pub async fn originate(&self, payload: Hash32) -> Result<(), GossipError> {
        self.enqueue(Inbound::Originate(payload)).await
    }

    /// Registers `peer` as a relay target of this node (one direction).
    pub async fn connect(&self, peer: &GossipHandle) -> Result<(), GossipError> {
        self.sender
            .send(Inbound::Connect {
                peer: peer.id,
                sender: peer.sender.clone(),
            })
            .await
            .map_err(|_| GossipError::Closed(self.id))
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot, GossipError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Inbound::Snapshot(tx))
            .await
            .map_err(|_| GossipError::Closed(self.id))?;
        rx.await.map_err(|_| GossipError::Closed(self.id))
    }

    async fn enqueue(&self, inbound: Inbound) -> Result<(), GossipError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(inbound).await.is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(GossipError::Closed(self.id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node task
// ---------------------------------------------------------------------------

/// The receiving side of a node. Consumed by [`GossipNode::run`].
pub struct GossipNode {
    protocol: GossipProtocol,
    inbox: mpsc::Receiver<Inbound>,
    peers: HashMap<NodeId, mpsc::Sender<Inbound>>,
    sink: Arc<dyn PayloadSink>,
    in_flight: Arc<AtomicUsize>,
    stats: NodeStats,
}

impl GossipNode {
    /// Creates a node and its handle. `in_flight` is shared by every node
    /// of a cluster.
    pub fn new(
        id: NodeId,
        config: &GossipConfig,
        sink: Arc<dyn PayloadSink>,
        in_flight: Arc<AtomicUsize>,
    ) -> (Self, GossipHandle) {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let node = Self {
            protocol: GossipProtocol::new(id, config),
            inbox,
            peers: HashMap::new(),
            sink,
            in_flight: in_flight.clone(),
            stats: NodeStats::default(),
        };
        let handle = GossipHandle {
            id,
            sender,
            in_flight,
        };
        (node, handle)
    }

    /// Processes the inbox until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let id = self.protocol.id();
        debug!(node = %id, "gossip node started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                inbound = self.inbox.recv() => {
                    let Some(inbound) = inbound else { break };
                    if !self.handle(inbound, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(
            node = %id,
            seen = self.protocol.seen_count(),
            relayed = self.stats.relayed,
            dropped = self.stats.dropped,
            "gossip node stopped"
        );
    }

    /// Returns `false` when shutdown interrupted a relay.
    async fn handle(&mut self, inbound: Inbound, shutdown: &mut watch::Receiver<bool>) -> bool {
        let keep_running = match inbound {
            Inbound::Gossip(message) => self.process(message, true, shutdown).await,
            Inbound::Originate(payload) => {
                self.process(GossipMessage::new(payload), false, shutdown).await
            }
            Inbound::Wire(bytes) => match GossipMessage::decode(&bytes) {
                Ok(message) => self.process(message, true, shutdown).await,
                Err(e) => {
                    warn!(node = %self.protocol.id(), error = %e, "dropping malformed gossip frame");
                    self.stats.rejected += 1;
                    true
                }
            },
            Inbound::Connect { peer, sender } => {
                if self.protocol.add_peer(peer) {
                    self.peers.insert(peer, sender);
                    debug!(node = %self.protocol.id(), peer = %peer, "peer connected");
                }
                return true;
            }
            Inbound::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                return true;
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        keep_running
    }

    async fn process(
        &mut self,
        message: GossipMessage,
        deliver: bool,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let sink = self.sink.clone();
        let outcome = self.protocol.handle_message(message, |payload| {
            if deliver {
                blocking(|| sink.accept(payload))
            } else {
                Ok(())
            }
        });

        let (message, targets) = match outcome {
            Ok(GossipAction::Drop) => {
                self.stats.dropped += 1;
                return true;
            }
            Ok(GossipAction::Relay { message, targets }) => (message, targets),
            Err(e) => {
                warn!(node = %self.protocol.id(), error = %e, "payload rejected, not relaying");
                self.stats.rejected += 1;
                return true;
            }
        };
        self.stats.processed += 1;

        for target in targets {
            let Some(sender) = self.peers.get(&target).cloned() else {
                continue;
            };
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                sent = sender.send(Inbound::Gossip(message.clone())) => {
                    if sent.is_err() {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        debug!(node = %self.protocol.id(), peer = %target, "peer inbox closed");
                    } else {
                        self.stats.relayed += 1;
                    }
                }
                _ = shutdown.changed() => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return false;
                }
            }
        }
        true
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.protocol.id(),
            seen: self.protocol.seen_payloads().copied().collect(),
            peers: self.protocol.peers().copied().collect(),
            processed: self.stats.processed,
            relayed: self.stats.relayed,
            dropped: self.stats.dropped,
            rejected: self.stats.rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::replication::NullSink;
    use std::time::Duration;

    type Spawned = (GossipHandle, watch::Sender<bool>, tokio::task::JoinHandle<()>);

    fn spawn(id: u32) -> Spawned {
        spawn_with(id, Arc::new(NullSink))
    }

    fn spawn_with(id: u32, sink: Arc<dyn PayloadSink>) -> Spawned {
        let (node, handle) = GossipNode::new(
            NodeId::new(id),
            &GossipConfig::default(),
            sink,
            Arc::new(AtomicUsize::new(0)),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(node.run(shutdown_rx));
        (handle, shutdown_tx, task)
    }

    #[tokio::test]
    async fn originate_records_payload() {
        let (handle, _shutdown, _task) = spawn(0);
        handle.originate(Hash32::from_bytes([1; 32])).await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.seen_count(), 1);
        assert_eq!(snap.processed, 1);
        assert_eq!(handle.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_frame_dropped_loop_survives() {
        let (handle, _shutdown, _task) = spawn(0);
        handle.receive_bytes(vec![1, 2, 3]).await.unwrap();
        handle
            .receive_bytes(GossipMessage::new(Hash32::from_bytes([2; 32])).encode().unwrap())
            .await
            .unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.seen_count(), 1);
    }

    #[tokio::test]
    async fn two_nodes_exchange() {
        let (a, _sa, _ta) = spawn(0);
        let (b, _sb, _tb) = spawn(1);
        a.connect(&b).await.unwrap();
        b.connect(&a).await.unwrap();

        a.originate(Hash32::from_bytes([3; 32])).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if b.snapshot().await.unwrap().seen_count() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let snap_a = a.snapshot().await.unwrap();
        assert_eq!(snap_a.peers, vec![NodeId::new(1)]);
        assert_eq!(snap_a.relayed, 1);
    }

    /// Blocks in `accept` until released from another task.
    struct Gate(parking_lot::Mutex<std::sync::mpsc::Receiver<()>>);

    impl PayloadSink for Gate {
        fn accept(&self, _payload: &Hash32) -> Result<(), crate::ledger::LedgerError> {
            self.0
                .lock()
                .recv_timeout(Duration::from_secs(10))
                .map_err(|_| crate::ledger::LedgerError::Validation("gate never opened".into()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn blocking_sink_leaves_runtime_free() {
        let (open, gate) = std::sync::mpsc::channel();
        let (handle, _shutdown, _task) =
            spawn_with(0, Arc::new(Gate(parking_lot::Mutex::new(gate))));

        handle
            .receive(GossipMessage::new(Hash32::from_bytes([4; 32])))
            .await
            .unwrap();
        // Only runs if the sole worker is not stuck inside the sink.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = open.send(());
        });

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.rejected, 0);
        assert_eq!(snap.seen_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_task() {
        let (handle, shutdown, task) = spawn(0);
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            handle.snapshot().await,
            Err(GossipError::Closed(_))
        ));
    }
}
