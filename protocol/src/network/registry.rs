//! Node registry: an arena of gossip nodes addressed by [`NodeId`].
//!
//! The registry spawns node tasks, wires peers together, tracks the
//! cluster-wide in-flight counter and owns the shutdown signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::gossip::{GossipConfig, GossipError, NodeId};
use super::node::{GossipHandle, GossipNode, NodeSnapshot};
use super::replication::PayloadSink;
use crate::config::QUIESCENCE_POLL_INTERVAL_MS;

pub struct NodeRegistry {
    nodes: Vec<GossipHandle>,
    tasks: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            nodes: Vec::new(),
            tasks: Vec::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Spawns a node task on the current runtime and returns its id.
    pub fn spawn_node(&mut self, sink: Arc<dyn PayloadSink>, config: &GossipConfig) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        let (node, handle) = GossipNode::new(id, config, sink, self.in_flight.clone());
        self.tasks.push(tokio::spawn(node.run(self.shutdown_rx.clone())));
        self.nodes.push(handle);
        debug!(node = %id, "node spawned");
        id
    }

    pub fn handle(&self, id: NodeId) -> Result<&GossipHandle, GossipError> {
        self.nodes.get(id.index()).ok_or(GossipError::UnknownNode(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(GossipHandle::id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connects `a` and `b` in both directions.
    pub async fn connect(&self, a: NodeId, b: NodeId) -> Result<(), GossipError> {
        let (ha, hb) = (self.handle(a)?, self.handle(b)?);
        ha.connect(hb).await?;
        hb.connect(ha).await
    }

    /// Connects every pair of nodes.
    pub async fn connect_all(&self) -> Result<(), GossipError> {
        for i in 0..self.nodes.len() {
            for j in (i + 1)..self.nodes.len() {
                self.connect(NodeId::new(i as u32), NodeId::new(j as u32)).await?;
            }
        }
        Ok(())
    }

    /// Messages enqueued but not yet fully handled, cluster-wide.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until no message is queued or being handled anywhere.
    pub async fn wait_for_quiescence(&self, timeout: Duration) -> Result<(), GossipError> {
        let poll = Duration::from_millis(QUIESCENCE_POLL_INTERVAL_MS);
        tokio::time::timeout(timeout, async {
            while self.in_flight() != 0 {
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .map_err(|_| GossipError::Timeout(timeout))
    }

    pub async fn snapshot(&self, id: NodeId) -> Result<NodeSnapshot, GossipError> {
        self.handle(id)?.snapshot().await
    }

    pub async fn snapshot_all(&self) -> Result<Vec<NodeSnapshot>, GossipError> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for handle in &self.nodes {
            out.push(handle.snapshot().await?);
        }
        Ok(out)
    }

    /// Signals every node to stop and waits for the tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!(nodes = self.nodes.len(), "gossip cluster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Hash32;
    use crate::network::replication::NullSink;

    #[tokio::test]
    async fn connect_all_builds_complete_graph() {
        let mut registry = NodeRegistry::new();
        for _ in 0..4 {
            registry.spawn_node(Arc::new(NullSink), &GossipConfig::default());
        }
        registry.connect_all().await.unwrap();

        let snaps = registry.snapshot_all().await.unwrap();
        let edges: usize = snaps.iter().map(|s| s.peers.len()).sum();
        assert_eq!(edges, 4 * 3);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_node_rejected() {
        let mut registry = NodeRegistry::new();
        let a = registry.spawn_node(Arc::new(NullSink), &GossipConfig::default());
        assert!(matches!(
            registry.connect(a, NodeId::new(7)).await,
            Err(GossipError::UnknownNode(_))
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn quiescence_after_broadcast() {
        let mut registry = NodeRegistry::new();
        for _ in 0..3 {
            registry.spawn_node(Arc::new(NullSink), &GossipConfig::default());
        }
        registry.connect_all().await.unwrap();
        registry
            .handle(NodeId::new(0))
            .unwrap()
            .originate(Hash32::from_bytes([1; 32]))
            .await
            .unwrap();

        registry
            .wait_for_quiescence(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(registry.in_flight(), 0);
        for snap in registry.snapshot_all().await.unwrap() {
            assert_eq!(snap.seen_count(), 1);
        }
        registry.shutdown().await;
    }
}
