// Ledger benchmarks for the accountant protocol.
//
// Covers dual signing, vertex construction and validation, committing
// vertices to an in-memory book, topological replay at various DAG sizes,
// and the gossip receive rule.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use accountant_protocol::crypto::{Ed25519Signer, Ed25519Verifier, Hash32, Signer};
use accountant_protocol::ledger::{replay_balances, AccountingBook, Vertex};
use accountant_protocol::network::{GossipConfig, GossipMessage, GossipProtocol, NodeId};
use accountant_protocol::storage::LedgerDB;
use accountant_protocol::transaction::{
    sign_as_issuer, sign_as_receiver, Spice, Transaction, TransactionBuilder,
};

fn transfer(from: &Ed25519Signer, to: &Ed25519Signer, currency: u64) -> Transaction {
    let mut tx = TransactionBuilder::new(from.address(), to.address())
        .subject("bench")
        .spice(Spice::from_currency(currency))
        .build();
    sign_as_issuer(&mut tx, from).expect("issuer signs");
    sign_as_receiver(&mut tx, to).expect("receiver signs");
    tx
}

fn book(signer: &Arc<Ed25519Signer>) -> AccountingBook {
    AccountingBook::open(
        LedgerDB::open_temporary().expect("temp db"),
        signer.clone(),
        Arc::new(Ed25519Verifier),
    )
    .expect("book")
}

/// A book with genesis plus `n` transfers, and its stored vertices.
fn populated(n: usize) -> Vec<Vertex> {
    let node = Arc::new(Ed25519Signer::generate());
    let peer = Ed25519Signer::generate();
    let book = book(&node);
    let mut vertices = vec![book.genesis(transfer(&node, &node, n as u64)).expect("genesis")];
    for _ in 0..n {
        vertices.push(book.create_vertex(transfer(&node, &peer, 1)).expect("vertex"));
    }
    vertices
}

fn bench_dual_signing(c: &mut Criterion) {
    let alice = Ed25519Signer::generate();
    let bob = Ed25519Signer::generate();

    c.bench_function("transaction/dual_sign", |b| {
        b.iter(|| transfer(&alice, &bob, 42));
    });
}

fn bench_vertex_new_and_validate(c: &mut Criterion) {
    let node = Ed25519Signer::generate();
    let tx = transfer(&node, &node, 10);
    let parent = Hash32::from_bytes([7; 32]);

    c.bench_function("vertex/new", |b| {
        b.iter_batched(
            || tx.clone(),
            |tx| Vertex::new(tx, parent, parent, parent, &node, &Ed25519Verifier).expect("vertex"),
            BatchSize::SmallInput,
        );
    });

    let vertex = Vertex::new(tx, parent, parent, parent, &node, &Ed25519Verifier).expect("vertex");
    c.bench_function("vertex/validate", |b| {
        b.iter(|| vertex.validate(&Ed25519Verifier).expect("valid"));
    });
}

fn bench_commit(c: &mut Criterion) {
    let node = Arc::new(Ed25519Signer::generate());
    let peer = Ed25519Signer::generate();
    let book = book(&node);
    book.genesis(transfer(&node, &node, u64::MAX / 2)).expect("genesis");

    c.bench_function("book/create_vertex", |b| {
        b.iter_batched(
            || transfer(&node, &peer, 1),
            |tx| book.create_vertex(tx).expect("commit"),
            BatchSize::SmallInput,
        );
    });
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/replay");
    for size in [100usize, 1_000] {
        let vertices = populated(size);
        group.throughput(Throughput::Elements(vertices.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &vertices, |b, vertices| {
            b.iter_batched(
                || vertices.clone(),
                |input| replay_balances(input, None).expect("replay"),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_gossip_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("gossip/handle_message");
    for peers in [4u32, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(peers), &peers, |b, &peers| {
            let mut protocol = GossipProtocol::new(NodeId::new(0), &GossipConfig::default());
            for p in 1..=peers {
                protocol.add_peer(NodeId::new(p));
            }
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&counter.to_le_bytes());
                let message = GossipMessage::new(Hash32::from_bytes(bytes));
                protocol
                    .handle_message(message, |_| Ok::<(), ()>(()))
                    .expect("relay")
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_dual_signing,
    bench_vertex_new_and_validate,
    bench_commit,
    bench_replay,
    bench_gossip_receive,
);
criterion_main!(benches);
