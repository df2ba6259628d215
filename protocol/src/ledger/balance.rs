//! # Balance Ledger
//!
//! Derived per-address Spice balances. Nothing here is signed or hashed:
//! the whole view can be rebuilt by replaying the stored DAG (see
//! [`super::replay`]), and the [`AccountingBook`] is the only writer.
//!
//! Applying a vertex debits the transaction issuer and credits the
//! receiver as one step. An overdraft rejects the whole application with a
//! `Conflict` and touches neither balance. The genesis vertex is the only
//! one that mints: it credits the receiver without a debit.
//!
//! A signed transaction moves funds once. Every applied transaction hash is
//! remembered, and a second vertex wrapping the same transaction is a
//! `Conflict` even though its own vertex hash is new.
//!
//! [`AccountingBook`]: super::AccountingBook

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::{LedgerError, LedgerResult};
use super::vertex::Vertex;
use crate::crypto::Hash32;
use crate::identity::Address;
use crate::transaction::Spice;

/// Balance of a single address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Hash of the last vertex applied to this address.
    pub last_applied: Hash32,
    pub amount: Spice,
}

/// Map of address to running balance.
#[derive(Debug, Clone, Default)]
pub struct BalanceLedger {
    balances: HashMap<Address, Balance>,
    transactions: HashSet<Hash32>,
    applied: usize,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dry run of [`apply_vertex`](Self::apply_vertex). Never mutates.
    pub fn check(&self, vertex: &Vertex) -> LedgerResult<()> {
        self.plan(vertex).map(|_| ())
    }

    /// Applies `vertex`. Returns `false` when the vertex was already the
    /// last one applied to the addresses it touches.
    pub fn apply_vertex(&mut self, vertex: &Vertex) -> LedgerResult<bool> {
        let Some(updates) = self.plan(vertex)? else {
            return Ok(false);
        };
        self.transactions.insert(vertex.transaction.hash);
        for (address, amount) in updates {
            self.balances.insert(
                address,
                Balance {
                    last_applied: vertex.hash,
                    amount,
                },
            );
        }
        self.applied += 1;
        Ok(true)
    }

    /// Computes the post-application amounts without writing them.
    fn plan(&self, vertex: &Vertex) -> LedgerResult<Option<Vec<(Address, Spice)>>> {
        let tx = &vertex.transaction;

        let watermark = if vertex.is_genesis() {
            &tx.receiver
        } else {
            &tx.issuer
        };
        if self
            .balances
            .get(watermark)
            .is_some_and(|b| b.last_applied == vertex.hash)
        {
            return Ok(None);
        }
        if self.transactions.contains(&tx.hash) {
            return Err(LedgerError::Conflict(format!(
                "transaction {} already applied",
                tx.hash
            )));
        }

        if vertex.is_genesis() {
            let credited = self.balance_of(&tx.receiver).checked_add(&tx.spice)?;
            return Ok(Some(vec![(tx.receiver.clone(), credited)]));
        }

        let debited = self
            .balance_of(&tx.issuer)
            .checked_sub(&tx.spice)
            .map_err(|e| LedgerError::Conflict(format!("insufficient funds: {e}")))?;

        if tx.issuer == tx.receiver {
            return Ok(Some(vec![(tx.issuer.clone(), self.balance_of(&tx.issuer))]));
        }

        let credited = self.balance_of(&tx.receiver).checked_add(&tx.spice)?;
        Ok(Some(vec![
            (tx.issuer.clone(), debited),
            (tx.receiver.clone(), credited),
        ]))
    }

    /// True if `vertex` would be applied but for the issuer's balance, i.e.
    /// it may succeed once more funds reach the issuer.
    pub fn is_underfunded(&self, vertex: &Vertex) -> bool {
        let tx = &vertex.transaction;
        !vertex.is_genesis()
            && !self.transactions.contains(&tx.hash)
            && self.balance_of(&tx.issuer).checked_sub(&tx.spice).is_err()
    }

    /// Whether a vertex carrying transaction `hash` has been applied.
    pub fn has_transaction(&self, hash: &Hash32) -> bool {
        self.transactions.contains(hash)
    }

    /// Current amount held by `address`; zero if never referenced.
    pub fn balance_of(&self, address: &Address) -> Spice {
        self.balances
            .get(address)
            .map(|b| b.amount)
            .unwrap_or(Spice::ZERO)
    }

    pub fn get(&self, address: &Address) -> Option<&Balance> {
        self.balances.get(address)
    }

    /// Number of addresses with a balance entry.
    pub fn accounts(&self) -> usize {
        self.balances.len()
    }

    /// Number of vertices applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Address-ordered amounts, for comparing two ledgers.
    pub fn amounts(&self) -> BTreeMap<Address, Spice> {
        self.balances
            .iter()
            .map(|(address, balance)| (address.clone(), balance.amount))
            .collect()
    }
}
