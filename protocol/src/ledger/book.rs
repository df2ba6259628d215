//! # Accounting Book
//!
//! The ledger's authoritative entry point. It builds vertices around
//! signed transactions, enforces the storage rules, keeps the derived
//! balances in step with the store and maintains the node's frontier.
//!
//! ## Commit path
//!
//! ```text
//! parents known? ─▶ balance check (dry run) ─▶ write-once insert ─▶ apply balance ─▶ frontier
//! ```
//!
//! A vertex is never stored unless both parents are already stored (the
//! genesis vertex excepted), and it never reaches the store if applying it
//! would overdraw its issuer. Every commit runs under one writer lock so
//! two commits on the same node never interleave; reads only take the
//! balance or frontier read locks.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::balance::BalanceLedger;
use super::error::{LedgerError, LedgerResult};
use super::frontier::Frontier;
use super::replay::{replay_balances, ReplayReport};
use super::vertex::Vertex;
use crate::crypto::{Hash32, Signer, Verifier};
use crate::identity::Address;
use crate::storage::LedgerDB;
use crate::transaction::{Spice, Transaction};

/// Result of [`AccountingBook::audit`].
#[derive(Debug, Default)]
pub struct AuditReport {
    pub checked: usize,
    /// Vertices that failed validation, with the reason.
    pub invalid: Vec<(Hash32, String)>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// A node's ledger: store, balances, frontier and signing identity.
pub struct AccountingBook {
    db: LedgerDB,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn Verifier>,
    frontier: Frontier,
    balances: RwLock<BalanceLedger>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for AccountingBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountingBook")
            .field("address", &self.signer.address())
            .field("vertices", &self.db.vertex_count())
            .finish()
    }
}

impl AccountingBook {
    /// Opens a book over `db`, restoring the frontier and replaying the
    /// stored vertices into fresh balances.
    pub fn open(
        db: LedgerDB,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
    ) -> LedgerResult<Self> {
        let frontier = match db.get_frontier()? {
            Some((last, before)) => Frontier::restore(last, before),
            None => Frontier::new(),
        };
        let report = replay_balances(db.vertices()?, None)?;
        info!(
            address = %signer.address(),
            vertices = db.vertex_count(),
            accounts = report.ledger.accounts(),
            "accounting book opened"
        );

        Ok(Self {
            db,
            signer,
            verifier,
            frontier,
            balances: RwLock::new(report.ledger),
            write_lock: Mutex::new(()),
        })
    }

    /// Address of this node's signing key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    // -- Construction and validation ------------------------------------------

    /// Builds and signs a vertex without touching storage.
    pub fn new_vertex(
        &self,
        transaction: Transaction,
        prev_hash: Hash32,
        left_parent: Hash32,
        right_parent: Hash32,
    ) -> LedgerResult<Vertex> {
        Vertex::new(
            transaction,
            prev_hash,
            left_parent,
            right_parent,
            self.signer.as_ref(),
            self.verifier.as_ref(),
        )
    }

    /// Re-verifies the transaction chain and the vertex signature.
    pub fn validate(&self, vertex: &Vertex) -> LedgerResult<()> {
        vertex.validate(self.verifier.as_ref())
    }

    // -- Commit ---------------------------------------------------------------

    /// Stores `vertex` and applies it to the balances.
    ///
    /// `Conflict` if the hash is already stored, a second genesis is
    /// offered or the issuer cannot afford it; `NotFound` if a parent is
    /// unknown. Nothing is written on any error.
    pub fn persist(&self, vertex: &Vertex) -> LedgerResult<()> {
        let _guard = self.write_lock.lock();
        self.persist_locked(vertex)
    }

    fn persist_locked(&self, vertex: &Vertex) -> LedgerResult<()> {
        if self.db.contains_vertex(&vertex.hash)? {
            return Err(LedgerError::Conflict(format!(
                "vertex {} already stored",
                vertex.hash
            )));
        }
        for parent in vertex.parents() {
            if !self.db.contains_vertex(&parent)? {
                return Err(LedgerError::NotFound(format!("unknown parent {parent}")));
            }
        }
        self.balances.read().check(vertex)?;

        let inserted = if vertex.is_genesis() {
            self.db.insert_genesis(vertex)?
        } else {
            self.db.insert_vertex(vertex)?
        };
        if !inserted {
            return Err(LedgerError::Conflict(if vertex.is_genesis() {
                "genesis already recorded".to_string()
            } else {
                format!("vertex {} already stored", vertex.hash)
            }));
        }

        self.balances.write().apply_vertex(vertex)?;
        debug!(vertex = %vertex.hash, issuer = %vertex.issuer, "vertex persisted");
        Ok(())
    }

    fn remember(&self, hash: Hash32) -> LedgerResult<()> {
        let (last, before) = self.frontier.remember(hash);
        self.db.put_frontier(&last, &before)?;
        Ok(())
    }

    /// Creates the genesis vertex, minting the transaction's Spice to its
    /// receiver.
    pub fn genesis(&self, transaction: Transaction) -> LedgerResult<Vertex> {
        let _guard = self.write_lock.lock();
        if let Some(existing) = self.db.genesis_hash()? {
            return Err(LedgerError::Conflict(format!(
                "genesis already recorded as {existing}"
            )));
        }
        let vertex = self.new_vertex(transaction, Hash32::ZERO, Hash32::ZERO, Hash32::ZERO)?;
        self.persist_locked(&vertex)?;
        self.remember(vertex.hash)?;
        info!(vertex = %vertex.hash, "genesis created");
        Ok(vertex)
    }

    /// Authors a vertex parented on this node's own frontier.
    ///
    /// A node that has not authored anything yet builds on genesis.
    pub fn create_vertex(&self, transaction: Transaction) -> LedgerResult<Vertex> {
        let _guard = self.write_lock.lock();
        let (last, before) = self.frontier.recall();
        let left = if last.is_zero() {
            self.db
                .genesis_hash()?
                .ok_or_else(|| LedgerError::NotFound("no genesis vertex".into()))?
        } else {
            last
        };
        let right = if before.is_zero() { left } else { before };

        let vertex = self.new_vertex(transaction, last, left, right)?;
        self.persist_locked(&vertex)?;
        self.remember(vertex.hash)?;
        Ok(vertex)
    }

    /// Authors a vertex on caller-chosen parents, e.g. a peer's tips. Both
    /// must already be stored.
    pub fn create_vertex_with_parents(
        &self,
        transaction: Transaction,
        left_parent: Hash32,
        right_parent: Hash32,
    ) -> LedgerResult<Vertex> {
        if left_parent.is_zero() || right_parent.is_zero() {
            return Err(LedgerError::Validation(
                "explicit parents must be non-zero; use genesis()".into(),
            ));
        }
        let _guard = self.write_lock.lock();
        let (last, _) = self.frontier.recall();
        let vertex = self.new_vertex(transaction, last, left_parent, right_parent)?;
        self.persist_locked(&vertex)?;
        self.remember(vertex.hash)?;
        Ok(vertex)
    }

    /// Validates and commits a vertex authored elsewhere.
    ///
    /// Returns `Ok(false)` if the vertex is already stored, so replicated
    /// duplicates are harmless. The frontier is not touched.
    pub fn accept_remote(&self, vertex: &Vertex) -> LedgerResult<bool> {
        if self.db.contains_vertex(&vertex.hash)? {
            return Ok(false);
        }
        self.validate(vertex)?;

        let _guard = self.write_lock.lock();
        // Another delivery of the same vertex may have won the lock.
        if self.db.contains_vertex(&vertex.hash)? {
            return Ok(false);
        }
        match self.persist_locked(vertex) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(vertex = %vertex.hash, error = %e, "remote vertex rejected");
                Err(e)
            }
        }
    }

    // -- Reads ----------------------------------------------------------------

    pub fn get_vertex(&self, hash: &Hash32) -> LedgerResult<Vertex> {
        self.db
            .get_vertex(hash)?
            .ok_or_else(|| LedgerError::NotFound(format!("vertex {hash}")))
    }

    pub fn contains(&self, hash: &Hash32) -> LedgerResult<bool> {
        Ok(self.db.contains_vertex(hash)?)
    }

    pub fn vertex_count(&self) -> usize {
        self.db.vertex_count()
    }

    pub fn genesis_hash(&self) -> LedgerResult<Option<Hash32>> {
        Ok(self.db.genesis_hash()?)
    }

    pub fn balance_of(&self, address: &Address) -> Spice {
        self.balances.read().balance_of(address)
    }

    /// Address-ordered snapshot of every balance.
    pub fn balances(&self) -> BTreeMap<Address, Spice> {
        self.balances.read().amounts()
    }

    /// True if `vertex` is refused only because its issuer cannot cover it
    /// yet; see [`BalanceLedger::is_underfunded`].
    pub fn is_underfunded(&self, vertex: &Vertex) -> bool {
        self.balances.read().is_underfunded(vertex)
    }

    pub fn account_count(&self) -> usize {
        self.balances.read().accounts()
    }

    /// `(last, one_before_last)` self-authored vertex hashes.
    pub fn frontier_recall(&self) -> (Hash32, Hash32) {
        self.frontier.recall()
    }

    // -- Audit and replay -----------------------------------------------------

    /// Re-validates every stored vertex and its parent linkage.
    pub fn audit(&self, shutdown: Option<&watch::Receiver<bool>>) -> LedgerResult<AuditReport> {
        let mut report = AuditReport::default();
        for vertex in self.db.vertices()? {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                return Err(LedgerError::Cancelled);
            }
            report.checked += 1;

            let mut outcome = self.validate(&vertex);
            if outcome.is_ok() {
                for parent in vertex.parents() {
                    if !self.db.contains_vertex(&parent)? {
                        outcome = Err(LedgerError::NotFound(format!("unknown parent {parent}")));
                        break;
                    }
                }
            }
            if let Err(e) = outcome {
                warn!(vertex = %vertex.hash, error = %e, "audit failure");
                report.invalid.push((vertex.hash, e.to_string()));
            }
        }
        Ok(report)
    }

    /// Replays the stored DAG into a fresh ledger without touching the
    /// live balances.
    pub fn replay(&self, shutdown: Option<&watch::Receiver<bool>>) -> LedgerResult<ReplayReport> {
        replay_balances(self.db.vertices()?, shutdown)
    }

    /// Replaces the live balances with a fresh replay. Returns the number
    /// of vertices applied.
    pub fn rebuild_balances(&self, shutdown: Option<&watch::Receiver<bool>>) -> LedgerResult<usize> {
        let _guard = self.write_lock.lock();
        let report = self.replay(shutdown)?;
        let applied = report.order.len();
        *self.balances.write() = report.ledger;
        Ok(applied)
    }

    /// Flushes the underlying store.
    pub fn flush(&self) -> LedgerResult<()> {
        Ok(self.db.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Signer, Ed25519Verifier};
    use crate::transaction::{sign_as_issuer, sign_as_receiver, TransactionBuilder};

    fn book_with(signer: Arc<Ed25519Signer>) -> AccountingBook {
        AccountingBook::open(
            LedgerDB::open_temporary().unwrap(),
            signer,
            Arc::new(Ed25519Verifier),
        )
        .unwrap()
    }

    fn transfer(from: &Ed25519Signer, to: &Ed25519Signer, currency: u64) -> Transaction {
        let mut tx = TransactionBuilder::new(from.address(), to.address())
            .spice(Spice::from_currency(currency))
            .build();
        sign_as_issuer(&mut tx, from).unwrap();
        sign_as_receiver(&mut tx, to).unwrap();
        tx
    }

    #[test]
    fn genesis_then_transfers() {
        let node = Arc::new(Ed25519Signer::generate());
        let bob = Ed25519Signer::generate();
        let book = book_with(node.clone());

        let g = book.genesis(transfer(&node, &node, 100)).unwrap();
        assert_eq!(book.frontier_recall(), (g.hash, Hash32::ZERO));
        assert_eq!(book.balance_of(&node.address()), Spice::from_currency(100));

        let v1 = book.create_vertex(transfer(&node, &bob, 30)).unwrap();
        assert_eq!((v1.left_parent, v1.right_parent), (g.hash, g.hash));
        assert_eq!(v1.prev_hash, g.hash);

        let v2 = book.create_vertex(transfer(&node, &bob, 20)).unwrap();
        assert_eq!((v2.left_parent, v2.right_parent), (v1.hash, g.hash));
        assert_eq!(book.frontier_recall(), (v2.hash, v1.hash));

        assert_eq!(book.balance_of(&node.address()), Spice::from_currency(50));
        assert_eq!(book.balance_of(&bob.address()), Spice::from_currency(50));
        assert_eq!(book.vertex_count(), 3);
    }

    #[test]
    fn second_genesis_conflicts() {
        let node = Arc::new(Ed25519Signer::generate());
        let book = book_with(node.clone());
        book.genesis(transfer(&node, &node, 1)).unwrap();
        assert!(matches!(
            book.genesis(transfer(&node, &node, 1)),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn create_without_genesis_not_found() {
        let node = Arc::new(Ed25519Signer::generate());
        let book = book_with(node.clone());
        assert!(matches!(
            book.create_vertex(transfer(&node, &node, 0)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_parent_leaves_store_unchanged() {
        let node = Arc::new(Ed25519Signer::generate());
        let book = book_with(node.clone());
        book.genesis(transfer(&node, &node, 10)).unwrap();

        let orphan = book
            .new_vertex(
                transfer(&node, &node, 1),
                Hash32::ZERO,
                Hash32::from_bytes([5; 32]),
                Hash32::from_bytes([6; 32]),
            )
            .unwrap();
        let before = book.vertex_count();
        assert!(matches!(book.persist(&orphan), Err(LedgerError::NotFound(_))));
        assert_eq!(book.vertex_count(), before);
        assert!(!book.contains(&orphan.hash).unwrap());
    }

    #[test]
    fn duplicate_persist_conflicts() {
        let node = Arc::new(Ed25519Signer::generate());
        let book = book_with(node.clone());
        let g = book.genesis(transfer(&node, &node, 10)).unwrap();
        let v = book
            .new_vertex(transfer(&node, &node, 1), g.hash, g.hash, g.hash)
            .unwrap();
        book.persist(&v).unwrap();
        assert!(matches!(book.persist(&v), Err(LedgerError::Conflict(_))));
        assert_eq!(book.balance_of(&node.address()), Spice::from_currency(10));
    }

    #[test]
    fn overdraft_rejected_before_store() {
        let node = Arc::new(Ed25519Signer::generate());
        let bob = Ed25519Signer::generate();
        let book = book_with(node.clone());
        book.genesis(transfer(&node, &node, 5)).unwrap();
        let frontier = book.frontier_recall();

        let err = book.create_vertex(transfer(&node, &bob, 6)).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(book.vertex_count(), 1);
        assert_eq!(book.frontier_recall(), frontier);
        assert_eq!(book.balance_of(&node.address()), Spice::from_currency(5));
        assert_eq!(book.balance_of(&bob.address()), Spice::ZERO);
    }

    #[test]
    fn same_transaction_cannot_be_wrapped_twice() {
        let node = Arc::new(Ed25519Signer::generate());
        let bob = Ed25519Signer::generate();
        let book = book_with(node.clone());
        book.genesis(transfer(&node, &node, 10)).unwrap();

        let tx = transfer(&node, &bob, 4);
        book.create_vertex(tx.clone()).unwrap();
        let frontier = book.frontier_recall();
        assert!(matches!(book.create_vertex(tx), Err(LedgerError::Conflict(_))));

        assert_eq!(book.vertex_count(), 2);
        assert_eq!(book.frontier_recall(), frontier);
        assert_eq!(book.balance_of(&node.address()), Spice::from_currency(6));
        assert_eq!(book.balance_of(&bob.address()), Spice::from_currency(4));
        assert_eq!(book.replay(None).unwrap().ledger.amounts(), book.balances());
    }

    #[test]
    fn sibling_funding_survives_replay_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(Ed25519Signer::generate());
        let (bob, carol) = (Ed25519Signer::generate(), Ed25519Signer::generate());
        let author = book_with(node.clone());
        let g = author.genesis(transfer(&node, &node, 10)).unwrap();

        // Both on (g, g); the spend is built first so it is the older one.
        let spend = author
            .new_vertex(transfer(&bob, &carol, 10), g.hash, g.hash, g.hash)
            .unwrap();
        let fund = author
            .new_vertex(transfer(&node, &bob, 10), g.hash, g.hash, g.hash)
            .unwrap();

        let balances = {
            let db = LedgerDB::open(dir.path()).unwrap();
            let book = AccountingBook::open(db, node.clone(), Arc::new(Ed25519Verifier)).unwrap();
            assert!(book.accept_remote(&g).unwrap());
            assert!(book.accept_remote(&fund).unwrap());
            assert!(book.accept_remote(&spend).unwrap());
            assert_eq!(book.balance_of(&carol.address()), Spice::from_currency(10));

            let report = book.replay(None).unwrap();
            assert!(report.skipped.is_empty());
            assert_eq!(report.ledger.amounts(), book.balances());
            book.flush().unwrap();
            book.balances()
        };

        let db = LedgerDB::open(dir.path()).unwrap();
        let book = AccountingBook::open(db, node, Arc::new(Ed25519Verifier)).unwrap();
        assert_eq!(book.balances(), balances);
    }

    #[test]
    fn accept_remote_replicates_and_is_idempotent() {
        let a = Arc::new(Ed25519Signer::generate());
        let b = Arc::new(Ed25519Signer::generate());
        let book_a = book_with(a.clone());
        let book_b = book_with(b.clone());

        let g = book_a.genesis(transfer(&a, &a, 10)).unwrap();
        let v = book_a.create_vertex(transfer(&a, &b, 4)).unwrap();

        assert!(matches!(book_b.accept_remote(&v), Err(LedgerError::NotFound(_))));
        assert!(book_b.accept_remote(&g).unwrap());
        assert!(book_b.accept_remote(&v).unwrap());
        assert!(!book_b.accept_remote(&v).unwrap());

        assert_eq!(book_b.balances(), book_a.balances());
        assert_eq!(book_b.frontier_recall(), (Hash32::ZERO, Hash32::ZERO));
    }

    #[test]
    fn accept_remote_rejects_forgery() {
        let a = Arc::new(Ed25519Signer::generate());
        let b = Arc::new(Ed25519Signer::generate());
        let book_a = book_with(a.clone());
        let book_b = book_with(b.clone());
        let mut g = book_a.genesis(transfer(&a, &a, 10)).unwrap();
        g.transaction.spice = Spice::from_currency(1_000);

        assert!(matches!(book_b.accept_remote(&g), Err(LedgerError::Validation(_))));
        assert_eq!(book_b.vertex_count(), 0);
    }

    #[test]
    fn explicit_parents_must_exist() {
        let node = Arc::new(Ed25519Signer::generate());
        let book = book_with(node.clone());
        let g = book.genesis(transfer(&node, &node, 10)).unwrap();

        let v = book
            .create_vertex_with_parents(transfer(&node, &node, 1), g.hash, g.hash)
            .unwrap();
        assert_eq!(v.left_parent, g.hash);
        assert!(matches!(
            book.create_vertex_with_parents(
                transfer(&node, &node, 1),
                v.hash,
                Hash32::from_bytes([1; 32])
            ),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            book.create_vertex_with_parents(transfer(&node, &node, 1), Hash32::ZERO, v.hash),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn audit_and_rebuild() {
        let node = Arc::new(Ed25519Signer::generate());
        let bob = Ed25519Signer::generate();
        let book = book_with(node.clone());
        book.genesis(transfer(&node, &node, 9)).unwrap();
        for _ in 0..3 {
            book.create_vertex(transfer(&node, &bob, 2)).unwrap();
        }

        let report = book.audit(None).unwrap();
        assert_eq!(report.checked, 4);
        assert!(report.is_clean());

        let before = book.balances();
        assert_eq!(book.rebuild_balances(None).unwrap(), 4);
        assert_eq!(book.balances(), before);

        let (_tx, rx) = watch::channel(true);
        assert!(matches!(book.audit(Some(&rx)), Err(LedgerError::Cancelled)));
    }

    #[test]
    fn reopen_restores_frontier_and_balances() {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(Ed25519Signer::generate());
        let bob = Ed25519Signer::generate();
        let (frontier, balances) = {
            let db = LedgerDB::open(dir.path()).unwrap();
            let book = AccountingBook::open(db, node.clone(), Arc::new(Ed25519Verifier)).unwrap();
            book.genesis(transfer(&node, &node, 9)).unwrap();
            book.create_vertex(transfer(&node, &bob, 4)).unwrap();
            book.flush().unwrap();
            (book.frontier_recall(), book.balances())
        };

        let db = LedgerDB::open(dir.path()).unwrap();
        let book = AccountingBook::open(db, node, Arc::new(Ed25519Verifier)).unwrap();
        assert_eq!(book.frontier_recall(), frontier);
        assert_eq!(book.balances(), balances);
    }
}
