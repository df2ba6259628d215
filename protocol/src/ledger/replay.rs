//! Topological replay: rebuilds a [`BalanceLedger`] from stored vertices.
//!
//! Kahn's algorithm over the parent links. A vertex becomes ready once all
//! of its distinct non-zero parents have been replayed; among ready
//! vertices the one that comes first in the input goes first.
//!
//! The book feeds vertices in store insertion order. That order is already
//! parents-first and is exactly the order the live balances saw them, so
//! replaying it reproduces the live balances even when an overdraft check
//! depends on which of two concurrent branches landed first.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::balance::BalanceLedger;
use super::error::{LedgerError, LedgerResult};
use super::vertex::Vertex;
use crate::crypto::Hash32;

/// Outcome of a replay.
#[derive(Debug)]
pub struct ReplayReport {
    pub ledger: BalanceLedger,
    /// Vertices applied in topological order.
    pub order: Vec<Hash32>,
    /// Vertices whose application was rejected (logged, not fatal).
    pub skipped: Vec<Hash32>,
}

/// Replays `vertices` parents-first into a fresh ledger, preferring input
/// order among vertices whose parents are done.
///
/// The shutdown signal is polled between vertices and yields
/// [`LedgerError::Cancelled`]. A parent missing from the set is
/// `NotFound`; vertices left over once the ready set drains form a cycle
/// and yield `Validation`.
pub fn replay_balances(
    vertices: Vec<Vertex>,
    shutdown: Option<&watch::Receiver<bool>>,
) -> LedgerResult<ReplayReport> {
    let total = vertices.len();
    let position: HashMap<Hash32, usize> = vertices
        .iter()
        .enumerate()
        .map(|(i, v)| (v.hash, i))
        .collect();
    if position.len() != total {
        return Err(LedgerError::Validation("duplicate vertex in replay input".into()));
    }

    let mut pending: Vec<usize> = Vec::with_capacity(total);
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut ready: BTreeSet<usize> = BTreeSet::new();

    for (i, vertex) in vertices.iter().enumerate() {
        let parents = vertex.parents();
        for parent in &parents {
            let Some(&p) = position.get(parent) else {
                return Err(LedgerError::NotFound(format!(
                    "parent {parent} of {}",
                    vertex.hash
                )));
            };
            children[p].push(i);
        }
        if parents.is_empty() {
            ready.insert(i);
        }
        pending.push(parents.len());
    }

    let mut ledger = BalanceLedger::new();
    let mut order = Vec::with_capacity(total);
    let mut skipped = Vec::new();

    while let Some(i) = ready.pop_first() {
        if shutdown.is_some_and(|rx| *rx.borrow()) {
            return Err(LedgerError::Cancelled);
        }

        let vertex = &vertices[i];
        match ledger.apply_vertex(vertex) {
            Ok(_) => order.push(vertex.hash),
            Err(e) => {
                warn!(vertex = %vertex.hash, error = %e, "replay skipped vertex");
                skipped.push(vertex.hash);
            }
        }

        for &child in &children[i] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.insert(child);
            }
        }
    }

    let processed = order.len() + skipped.len();
    if processed != total {
        return Err(LedgerError::Validation(format!(
            "cycle: {} of {total} vertices unreachable from genesis",
            total - processed
        )));
    }

    debug!(applied = order.len(), skipped = skipped.len(), "replay complete");
    Ok(ReplayReport {
        ledger,
        order,
        skipped,
    })
}
