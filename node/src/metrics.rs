//! # Prometheus Metrics
//!
//! Operational counters for a ledger node or a simulated cluster. Rendered
//! in the Prometheus text exposition format at the end of a run.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

use accountant_protocol::network::NodeSnapshot;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Vertices created locally (genesis included).
    pub vertices_authored_total: IntCounter,
    /// Vertices in the store, summed over local books.
    pub vertices_stored: IntGauge,
    /// Gossip messages delivered or relayed on.
    pub gossip_processed_total: IntCounter,
    /// Relays enqueued to peers.
    pub gossip_relayed_total: IntCounter,
    /// Duplicate gossip messages dropped.
    pub gossip_dropped_total: IntCounter,
    /// Payloads refused by the ledger plus undecodable frames.
    pub gossip_rejected_total: IntCounter,
    /// Accounts with a balance entry.
    pub balance_accounts: IntGauge,
    /// Time for one round of originations to settle cluster-wide.
    pub round_settle_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("accountant".into()), None)?;

        let vertices_authored_total = IntCounter::new(
            "vertices_authored_total",
            "Total number of vertices created locally",
        )?;
        registry.register(Box::new(vertices_authored_total.clone()))?;

        let vertices_stored = IntGauge::new("vertices_stored", "Vertices held in the store")?;
        registry.register(Box::new(vertices_stored.clone()))?;

        let gossip_processed_total = IntCounter::new(
            "gossip_processed_total",
            "Gossip messages delivered or relayed on",
        )?;
        registry.register(Box::new(gossip_processed_total.clone()))?;

        let gossip_relayed_total =
            IntCounter::new("gossip_relayed_total", "Gossip relays enqueued to peers")?;
        registry.register(Box::new(gossip_relayed_total.clone()))?;

        let gossip_dropped_total = IntCounter::new(
            "gossip_dropped_total",
            "Duplicate gossip messages dropped",
        )?;
        registry.register(Box::new(gossip_dropped_total.clone()))?;

        let gossip_rejected_total = IntCounter::new(
            "gossip_rejected_total",
            "Gossip payloads refused by the ledger or undecodable",
        )?;
        registry.register(Box::new(gossip_rejected_total.clone()))?;

        let balance_accounts =
            IntGauge::new("balance_accounts", "Accounts with a balance entry")?;
        registry.register(Box::new(balance_accounts.clone()))?;

        let round_settle_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "round_settle_seconds",
                "Time for a round of originations to reach quiescence",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(round_settle_seconds.clone()))?;

        Ok(Self {
            registry,
            vertices_authored_total,
            vertices_stored,
            gossip_processed_total,
            gossip_relayed_total,
            gossip_dropped_total,
            gossip_rejected_total,
            balance_accounts,
            round_settle_seconds,
        })
    }

    /// Folds per-node gossip counters into the cluster totals.
    pub fn record_snapshots(&self, snapshots: &[NodeSnapshot]) {
        for snap in snapshots {
            self.gossip_processed_total.inc_by(snap.processed);
            self.gossip_relayed_total.inc_by(snap.relayed);
            self.gossip_dropped_total.inc_by(snap.dropped);
            self.gossip_rejected_total.inc_by(snap.rejected);
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
