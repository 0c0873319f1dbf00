//! Determinism tests.
//!
//! The same inputs must produce the same committed chain and byte-identical
//! world states, both across replicas in one run and across independent
//! runs. Replay through restore must reproduce the live state exactly.

use ledger_node::{NodeConfig, SimCluster};
use ledger_types::test_utils::test_keypair;
use ledger_types::{
    AccountId, Amount, AssetId, Batch, BlockHeight, Command, Transaction, TransactionPayload,
};
use ledger_wsv::{restore_wsv, BlockStore, ChainValidator, MemoryBackend};

const STEP_BUDGET: usize = 50_000;

fn mint_batch(amount: &str, nonce: u64) -> Batch {
    let keypair = test_keypair(0);
    let mut tx = Transaction::new(TransactionPayload {
        creator_account_id: Some(AccountId::new("admin", "test")),
        commands: vec![Command::AddAssetQuantity {
            asset_id: AssetId::new("coin", "test"),
            amount: Amount::parse(amount).unwrap(),
        }],
        quorum: 1,
        created_ms: nonce,
    });
    tx.sign(&keypair);
    Batch::single(tx)
}

fn run_scenario() -> SimCluster {
    let mut cluster = SimCluster::new(4, NodeConfig::default());
    cluster.submit(0, mint_batch("10.50", 1));
    cluster.submit(2, mint_batch("0.25", 2));
    assert!(cluster.run_until(
        |c| (0..4).all(|i| c.committed_height(i) >= 3),
        STEP_BUDGET
    ));
    cluster
}

#[test]
fn identical_runs_commit_identical_chains() {
    let a = run_scenario();
    let b = run_scenario();

    assert_eq!(a.committed_height(0), b.committed_height(0));
    assert_eq!(a.node(0).backend().dump(), b.node(0).backend().dump());

    // Same block hashes along the chain.
    let store_a = BlockStore::new(a.node(0).backend());
    let store_b = BlockStore::new(b.node(0).backend());
    for height in 1..=a.committed_height(0) {
        assert_eq!(
            store_a.get(BlockHeight(height)).unwrap().unwrap().hash(),
            store_b.get(BlockHeight(height)).unwrap().unwrap().hash(),
            "block {height} differs between runs"
        );
    }
}

#[test]
fn restore_reproduces_the_live_world_state() {
    let cluster = run_scenario();
    let live = cluster.node(0).backend();
    let top = cluster.committed_height(0);

    // Copy the block chain onto a fresh backend and replay it.
    let replica = MemoryBackend::new();
    let source = BlockStore::new(live);
    let target = BlockStore::new(&replica);
    for height in 1..=top {
        target
            .put(&source.get(BlockHeight(height)).unwrap().unwrap())
            .unwrap();
    }
    let applied = restore_wsv(&replica, &ChainValidator, false).unwrap();
    assert_eq!(applied, BlockHeight(top));

    assert_eq!(replica.dump(), live.dump(), "replayed state diverged");
}

#[test]
fn all_replicas_agree_on_the_chain() {
    let cluster = run_scenario();
    let reference = BlockStore::new(cluster.node(0).backend());

    for i in 1..4 {
        let store = BlockStore::new(cluster.node(i).backend());
        assert_eq!(store.top_height().unwrap().0, cluster.committed_height(0));
        for height in 1..=cluster.committed_height(0) {
            assert_eq!(
                store.get(BlockHeight(height)).unwrap().unwrap().hash(),
                reference.get(BlockHeight(height)).unwrap().unwrap().hash()
            );
        }
    }
}
