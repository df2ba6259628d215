//! In-process cluster simulation.
//!
//! Spawns a fully connected set of gossip nodes, each backed by its own
//! accounting book, and drives them through rounds of transfers:
//!
//! ```text
//! round 0   node 0 mints genesis
//! round 1   node 0 funds every other node
//! round 2.. node i pays node i+1 (mod n)
//! ```
//!
//! The cluster settles between rounds so each round can be timed. A replica
//! that hears of a spend before the credit funding it holds the spend back
//! until the credit lands. Ordering across nodes is causal only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use accountant_protocol::crypto::{Ed25519Signer, Ed25519Verifier, Hash32, Signer};
use accountant_protocol::ledger::AccountingBook;
use accountant_protocol::network::{
    GossipConfig, LedgerReplicator, NodeId, NodeRegistry, NodeSnapshot, VertexDirectory,
};
use accountant_protocol::storage::LedgerDB;
use accountant_protocol::transaction::{
    sign_as_issuer, sign_as_receiver, Spice, Transaction, TransactionBuilder,
};

use crate::config::SimulationConfig;
use crate::metrics::NodeMetrics;

/// Outcome of a simulation run, printed as JSON.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub nodes: usize,
    pub rounds: usize,
    /// Vertices every node should hold.
    pub expected_vertices: usize,
    /// All books hold the expected vertex count and identical balances.
    pub converged: bool,
    /// Every book's replay matches its live balances.
    pub replay_consistent: bool,
    /// Final balances match the closed-form expectation.
    pub balances_expected: bool,
    pub audit_failures: usize,
    pub balances: BTreeMap<String, String>,
    pub gossip: Vec<GossipReport>,
}

impl SimulationReport {
    pub fn is_healthy(&self) -> bool {
        self.converged && self.replay_consistent && self.balances_expected && self.audit_failures == 0
    }
}

#[derive(Debug, Serialize)]
pub struct GossipReport {
    pub node: String,
    pub seen: usize,
    pub processed: u64,
    pub relayed: u64,
    pub dropped: u64,
    pub rejected: u64,
}

impl From<&NodeSnapshot> for GossipReport {
    fn from(snap: &NodeSnapshot) -> Self {
        Self {
            node: snap.id.to_string(),
            seen: snap.seen_count(),
            processed: snap.processed,
            relayed: snap.relayed,
            dropped: snap.dropped,
            rejected: snap.rejected,
        }
    }
}

/// Checks that the configured amounts cannot overdraw anyone.
pub fn validate(config: &SimulationConfig) -> Result<()> {
    ensure!(config.nodes >= 1, "a simulation needs at least one node");
    let ring = config
        .transfer_amount
        .checked_mul(config.rounds as u64)
        .context("transfer total overflows")?;
    let handed_out = config
        .distribution_amount
        .checked_mul(config.nodes.saturating_sub(1) as u64)
        .context("distribution total overflows")?;
    ensure!(
        config.nodes == 1 || config.distribution_amount >= ring,
        "distribution of {} cannot cover {} rounds of {}",
        config.distribution_amount,
        config.rounds,
        config.transfer_amount
    );
    ensure!(
        config.genesis_amount >= handed_out.saturating_add(ring),
        "genesis of {} cannot cover distribution ({handed_out}) plus transfers ({ring})",
        config.genesis_amount
    );
    Ok(())
}

/// Builds a transfer signed by both parties.
pub fn signed_transfer(from: &Ed25519Signer, to: &Ed25519Signer, amount: u64) -> Result<Transaction> {
    let mut tx = TransactionBuilder::new(from.address(), to.address())
        .subject("transfer")
        .spice(Spice::from_currency(amount))
        .build();
    sign_as_issuer(&mut tx, from)?;
    sign_as_receiver(&mut tx, to)?;
    Ok(tx)
}

struct Cluster {
    registry: NodeRegistry,
    books: Vec<Arc<AccountingBook>>,
    signers: Vec<Arc<Ed25519Signer>>,
    timeout: Duration,
}

impl Cluster {
    async fn start(config: &SimulationConfig, gossip: &GossipConfig) -> Result<Self> {
        let directory = Arc::new(VertexDirectory::new());
        let mut registry = NodeRegistry::new();
        let mut books = Vec::with_capacity(config.nodes);
        let mut signers = Vec::with_capacity(config.nodes);

        for _ in 0..config.nodes {
            let signer = Arc::new(Ed25519Signer::generate());
            let book = Arc::new(AccountingBook::open(
                LedgerDB::open_temporary()?,
                signer.clone(),
                Arc::new(Ed25519Verifier),
            )?);
            let sink = Arc::new(LedgerReplicator::new(book.clone(), directory.clone()));
            let id = registry.spawn_node(sink, gossip);
            directory.register(id, book.clone());
            books.push(book);
            signers.push(signer);
        }
        registry.connect_all().await?;
        info!(nodes = config.nodes, "cluster started");

        Ok(Self {
            registry,
            books,
            signers,
            timeout: Duration::from_secs(config.quiescence_timeout_secs),
        })
    }

    /// Originates `vertices` at their authors and waits for the cluster to
    /// settle.
    async fn settle(&self, vertices: &[(usize, Hash32)], metrics: &NodeMetrics) -> Result<()> {
        let timer = metrics.round_settle_seconds.start_timer();
        for (author, hash) in vertices {
            self.registry
                .handle(NodeId::new(*author as u32))?
                .originate(*hash)
                .await?;
        }
        self.registry
            .wait_for_quiescence(self.timeout)
            .await
            .context("cluster did not settle")?;
        timer.observe_duration();
        Ok(())
    }

    fn transfer(
        &self,
        from: usize,
        to: usize,
        amount: u64,
        metrics: &NodeMetrics,
    ) -> Result<(usize, Hash32)> {
        let tx = signed_transfer(&self.signers[from], &self.signers[to], amount)?;
        let vertex = self.books[from]
            .create_vertex(tx)
            .with_context(|| format!("node {from} failed to pay node {to}"))?;
        metrics.vertices_authored_total.inc();
        Ok((from, vertex.hash))
    }

    async fn drive(&self, config: &SimulationConfig, metrics: &NodeMetrics) -> Result<()> {
        let n = self.books.len();

        let mint = signed_transfer(&self.signers[0], &self.signers[0], config.genesis_amount)?;
        let genesis = self.books[0].genesis(mint)?;
        metrics.vertices_authored_total.inc();
        self.settle(&[(0, genesis.hash)], metrics).await?;
        info!(genesis = %genesis.hash, "genesis replicated");

        let mut funding = Vec::with_capacity(n.saturating_sub(1));
        for to in 1..n {
            funding.push(self.transfer(0, to, config.distribution_amount, metrics)?);
        }
        self.settle(&funding, metrics).await?;

        for round in 0..config.rounds {
            let mut batch = Vec::with_capacity(n);
            for from in 0..n {
                batch.push(self.transfer(from, (from + 1) % n, config.transfer_amount, metrics)?);
            }
            self.settle(&batch, metrics).await?;
            debug!(round, "round settled");
        }
        Ok(())
    }

    fn expected_balances(&self, config: &SimulationConfig) -> BTreeMap<String, String> {
        let n = self.signers.len() as u64;
        self.signers
            .iter()
            .enumerate()
            .map(|(i, signer)| {
                // Ring transfers net to zero for every node.
                let amount = if i == 0 {
                    config.genesis_amount - config.distribution_amount * (n - 1)
                } else {
                    config.distribution_amount
                };
                (
                    signer.address().to_string(),
                    Spice::from_currency(amount).to_string(),
                )
            })
            .collect()
    }

    async fn report(&self, config: &SimulationConfig, metrics: &NodeMetrics) -> Result<SimulationReport> {
        let n = self.books.len();
        let expected_vertices = 1 + (n - 1) + config.rounds * n;

        let snapshots = self.registry.snapshot_all().await?;
        metrics.record_snapshots(&snapshots);

        let reference = self.books[0].balances();
        let mut converged = true;
        let mut replay_consistent = true;
        let mut audit_failures = 0;
        let mut stored = 0;

        for (i, book) in self.books.iter().enumerate() {
            stored += book.vertex_count();
            if book.vertex_count() != expected_vertices || book.balances() != reference {
                converged = false;
                warn!(node = i, vertices = book.vertex_count(), "node diverged");
            }
            audit_failures += book.audit(None)?.invalid.len();
            if book.replay(None)?.ledger.amounts() != book.balances() {
                replay_consistent = false;
            }
        }
        metrics.vertices_stored.set(stored as i64);
        metrics.balance_accounts.set(self.books[0].account_count() as i64);

        let balances: BTreeMap<String, String> = reference
            .iter()
            .map(|(address, amount)| (address.to_string(), amount.to_string()))
            .collect();
        let balances_expected = balances == self.expected_balances(config);

        Ok(SimulationReport {
            nodes: n,
            rounds: config.rounds,
            expected_vertices,
            converged,
            replay_consistent,
            balances_expected,
            audit_failures,
            balances,
            gossip: snapshots.iter().map(GossipReport::from).collect(),
        })
    }

    async fn shutdown(self) {
        self.registry.shutdown().await;
    }
}

/// Runs a full simulation and reports convergence.
pub async fn run(
    config: &SimulationConfig,
    gossip: &GossipConfig,
    metrics: &NodeMetrics,
) -> Result<SimulationReport> {
    validate(config)?;
    let cluster = Cluster::start(config, gossip).await?;

    let outcome = match cluster.drive(config, metrics).await {
        Ok(()) => cluster.report(config, metrics).await,
        Err(e) => Err(e),
    };
    cluster.shutdown().await;

    let report = outcome?;
    info!(
        converged = report.converged,
        vertices = report.expected_vertices,
        "simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimulationConfig {
        SimulationConfig {
            nodes: 3,
            rounds: 2,
            genesis_amount: 1_000,
            distribution_amount: 100,
            transfer_amount: 5,
            quiescence_timeout_secs: 10,
        }
    }

    #[test]
    fn validate_rejects_underfunded_rounds() {
        let mut config = small();
        config.transfer_amount = 60;
        assert!(validate(&config).is_err());

        let mut config = small();
        config.genesis_amount = 150;
        assert!(validate(&config).is_err());

        config.nodes = 0;
        assert!(validate(&config).is_err());
        assert!(validate(&small()).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn small_cluster_converges() {
        let metrics = NodeMetrics::new().unwrap();
        let report = run(&small(), &GossipConfig::default(), &metrics).await.unwrap();

        assert!(report.is_healthy(), "{report:?}");
        assert_eq!(report.expected_vertices, 1 + 2 + 2 * 3);
        assert_eq!(report.balances.len(), 3);
        for node in &report.gossip {
            assert_eq!(node.seen, report.expected_vertices);
            assert_eq!(node.rejected, 0);
        }
        assert_eq!(metrics.vertices_authored_total.get(), 9);
    }

    #[tokio::test]
    async fn single_node_keeps_genesis() {
        let mut config = small();
        config.nodes = 1;
        let metrics = NodeMetrics::new().unwrap();
        let report = run(&config, &GossipConfig::default(), &metrics).await.unwrap();

        assert!(report.is_healthy(), "{report:?}");
        assert_eq!(report.expected_vertices, 3);
        assert_eq!(
            report.balances.values().next().map(String::as_str),
            Some(Spice::from_currency(1_000).to_string().as_str())
        );
    }
}
