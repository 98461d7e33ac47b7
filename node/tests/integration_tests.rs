//! End-to-end scenarios over the assembled node core: ingest through the
//! block processor, cementing, unchecked flushing, and bootstrap between
//! two in-process nodes over a duplex stream.

use std::sync::Arc;

use weave_blocks::{Block, StateBlock};
use weave_crypto::{keypair_from_seed, KeyPair};
use weave_ledger::{dev_genesis_keypair, RollbackError};
use weave_node::bootstrap::{compare_frontiers, BootstrapClient, BootstrapServer};
use weave_node::{BlockSource, Node, NodeConfig};
use weave_store::{PendingKey, Writer};
use weave_types::{Account, Amount, BlockHash, Link, NetworkId};

fn make_node(dir: &tempfile::TempDir) -> Arc<Node> {
    let config = NodeConfig::dev(dir.path().to_path_buf());
    Node::new(config).expect("node")
}

fn account_of(keypair: &KeyPair) -> Account {
    Account::new(*keypair.public.as_bytes())
}

fn genesis_account(node: &Node) -> Account {
    node.ledger.constants().genesis_account
}

fn genesis_hash(node: &Node) -> BlockHash {
    node.ledger.constants().genesis_block.hash()
}

fn state_send(
    keypair: &KeyPair,
    previous: BlockHash,
    representative: Account,
    new_balance: Amount,
    destination: Account,
) -> Block {
    Block::State(StateBlock::new(
        account_of(keypair),
        previous,
        representative,
        new_balance,
        Link::from(destination),
        &keypair.private,
        0,
    ))
}

fn state_receive(
    keypair: &KeyPair,
    previous: BlockHash,
    representative: Account,
    new_balance: Amount,
    source: BlockHash,
) -> Block {
    Block::State(StateBlock::new(
        account_of(keypair),
        previous,
        representative,
        new_balance,
        Link::from(source),
        &keypair.private,
        0,
    ))
}

/// Drive the processor synchronously until its queues drain.
fn pump(node: &Node) {
    while node.block_processor.queue_len() > 0 {
        node.block_processor.process_batch().expect("process batch");
    }
}

fn head_of(node: &Node, account: &Account) -> Option<BlockHash> {
    let txn = node.store.tx_begin_read().unwrap();
    node.ledger.latest(txn.raw(), account).unwrap()
}

fn block_exists(node: &Node, hash: &BlockHash) -> bool {
    let txn = node.store.tx_begin_read().unwrap();
    node.store.block.exists(txn.raw(), hash).unwrap()
}

/// Apply a block directly to the ledger (test seeding).
fn apply(node: &Node, block: &Block) {
    let mut txn = node.store.tx_begin_write(Writer::Testing).unwrap();
    let result = node.ledger.process(&mut txn, block).unwrap();
    assert_eq!(result, weave_ledger::ProcessResult::Progress, "{block:?}");
    txn.commit().unwrap();
}

// ── Scenario: genesis receive ───────────────────────────────────────────

#[test]
fn genesis_send_and_open_through_processor() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[1u8; 32]);
    let account1 = account_of(&key1);

    let send_balance = Amount::MAX_SUPPLY.checked_sub(Amount::new(100)).unwrap();
    let send = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis_account(&node),
        send_balance,
        account1,
    );
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(100), send.hash());

    assert!(node.block_processor.add(send.clone(), BlockSource::Live));
    assert!(node.block_processor.add(open.clone(), BlockSource::Live));
    pump(&node);

    let txn = node.store.tx_begin_read().unwrap();
    assert_eq!(
        node.ledger.balance(txn.raw(), &send.hash()).unwrap(),
        Some(send_balance)
    );
    assert_eq!(
        node.ledger.balance(txn.raw(), &open.hash()).unwrap(),
        Some(Amount::new(100))
    );
    assert_eq!(node.store.pending.count(txn.raw()).unwrap(), 0);
    assert_eq!(node.ledger.weight(&account1), Amount::new(100));
    assert_eq!(node.stats.get("blocks_progress"), 2);
}

// ── Scenario: fork detection ────────────────────────────────────────────

#[test]
fn second_send_with_same_previous_starts_election() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();

    let first = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis_account(&node),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(100)).unwrap(),
        Account::new([0x01; 32]),
    );
    let second = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis_account(&node),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(200)).unwrap(),
        Account::new([0x02; 32]),
    );

    node.block_processor.add(first.clone(), BlockSource::Live);
    pump(&node);
    node.block_processor.add(second.clone(), BlockSource::Live);
    pump(&node);

    assert_eq!(head_of(&node, &genesis_account(&node)), Some(first.hash()));
    assert_eq!(node.stats.get("blocks_fork"), 1);
    assert!(node.active.active(&second));
}

// ── Scenario: unchecked flush ───────────────────────────────────────────

#[test]
fn dependent_block_waits_in_unchecked_then_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[2u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis_account(&node),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(50)).unwrap(),
        account1,
    );
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(50), send.hash());

    // The open arrives first: its source is unknown.
    node.block_processor.add(open.clone(), BlockSource::Live);
    pump(&node);
    {
        let txn = node.store.tx_begin_read().unwrap();
        assert_eq!(node.store.unchecked.count(txn.raw()).unwrap(), 1);
        let dependents = node
            .store
            .unchecked
            .get_dependents(txn.raw(), &send.hash())
            .unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].1.block.hash(), open.hash());
    }

    // The send arrives: the open must flush out behind it.
    node.block_processor.add(send.clone(), BlockSource::Live);
    pump(&node);

    let txn = node.store.tx_begin_read().unwrap();
    assert_eq!(node.store.unchecked.count(txn.raw()).unwrap(), 0);
    assert!(node.store.block.exists(txn.raw(), &send.hash()).unwrap());
    assert!(node.store.block.exists(txn.raw(), &open.hash()).unwrap());
    assert_eq!(
        node.store.block.successor(txn.raw(), &genesis_hash(&node)).unwrap(),
        Some(send.hash())
    );
    assert_eq!(node.stats.get("unchecked_flushed"), 1);
}

// ── Scenario: confirmation height monotonicity ──────────────────────────

#[test]
fn cementing_advances_monotonically_and_blocks_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[3u8; 32]);
    let account1 = account_of(&key1);
    let genesis = genesis_account(&node);

    // genesis: G -> S1 -> S2; K1: R1 (receives S1).
    let s1 = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(10)).unwrap(),
        account1,
    );
    let r1 = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(10), s1.hash());
    let s2 = state_send(
        &genesis_kp,
        s1.hash(),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(30)).unwrap(),
        account1,
    );
    apply(&node, &s1);
    apply(&node, &r1);
    apply(&node, &s2);

    let cemented = node.confirmation_height.process(&s2.hash()).unwrap();
    assert_eq!(cemented, 2, "S1 and S2 newly cemented");

    let txn = node.store.tx_begin_read().unwrap();
    let info = node
        .store
        .confirmation_height
        .get(txn.raw(), &genesis)
        .unwrap()
        .unwrap();
    assert_eq!(info.height, 3);
    assert_eq!(info.frontier, s2.hash());
    drop(txn);

    // Re-processing an already cemented hash is a no-op.
    assert_eq!(node.confirmation_height.process(&s1.hash()).unwrap(), 0);

    // Nothing at or below S2 can be rolled back now.
    let mut txn = node.store.tx_begin_write(Writer::Testing).unwrap();
    for hash in [s1.hash(), s2.hash()] {
        assert!(matches!(
            node.ledger.rollback(&mut txn, &hash),
            Err(RollbackError::Cemented { .. })
        ));
    }
}

#[test]
fn cementing_a_receive_cements_its_source_chain_first() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[4u8; 32]);
    let account1 = account_of(&key1);
    let genesis = genesis_account(&node);

    let s1 = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(5)).unwrap(),
        account1,
    );
    let r1 = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(5), s1.hash());
    apply(&node, &s1);
    apply(&node, &r1);

    // Confirming only the receive must pull in the source send.
    let cemented = node.confirmation_height.process(&r1.hash()).unwrap();
    assert_eq!(cemented, 2);

    let txn = node.store.tx_begin_read().unwrap();
    assert_eq!(
        node.store
            .confirmation_height
            .get(txn.raw(), &genesis)
            .unwrap()
            .unwrap()
            .height,
        2
    );
    assert_eq!(
        node.store
            .confirmation_height
            .get(txn.raw(), &account1)
            .unwrap()
            .unwrap()
            .height,
        1
    );
}

#[test]
fn vanished_confirmation_target_counts_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);

    let missing = BlockHash::new([0x5E; 32]);
    assert_eq!(node.confirmation_height.process(&missing).unwrap(), 0);
    assert_eq!(node.confirmation_height.invalid_block_count(), 1);
}

// ── Scenario: bootstrap pull ────────────────────────────────────────────

/// Pull everything node `b` is missing from node `a` over an in-process
/// stream, mimicking one legacy bootstrap pass.
async fn bootstrap_between(a: &Arc<Node>, b: &Arc<Node>) {
    let server = Arc::new(BootstrapServer::new(
        Arc::clone(&a.ledger),
        NetworkId::Dev,
        16,
    ));
    let (client_stream, server_stream) = tokio::io::duplex(1024 * 1024);

    let server_task = {
        let server = Arc::clone(&server);
        let a = Arc::clone(a);
        tokio::spawn(async move {
            let _ = server
                .serve(server_stream, move |block| {
                    a.block_processor.add(block, BlockSource::Live);
                })
                .await;
        })
    };

    let mut client = BootstrapClient::new(client_stream, NetworkId::Dev);
    let remote = client
        .request_frontiers(Account::ZERO, u32::MAX, u32::MAX)
        .await
        .unwrap();

    let local: Vec<(Account, BlockHash)> = {
        let txn = b.store.tx_begin_read().unwrap();
        b.store
            .account
            .iter(txn.raw())
            .unwrap()
            .map(|entry| {
                let (account, info) = entry.unwrap();
                (account, info.head)
            })
            .collect()
    };
    let comparison = compare_frontiers(&local, &remote, |hash| block_exists(b, hash));

    for pull in comparison.pulls {
        let blocks = client.bulk_pull(&pull).await.unwrap();
        // Blocks stream newest-first; the processor's unchecked pool
        // reorders them, but feeding oldest-first converges faster.
        for block in blocks.into_iter().rev() {
            b.block_processor.add(block, BlockSource::Bootstrap);
        }
        pump(b);
    }
    drop(client);
    let _ = server_task.await;
}

#[tokio::test]
async fn bootstrap_pull_converges_to_server_head() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let node_a = make_node(&dir_a);
    let node_b = make_node(&dir_b);
    let genesis_kp = dev_genesis_keypair();
    let genesis = genesis_account(&node_a);

    // A has [genesis, S1, S2]; B has only genesis.
    let s1 = state_send(
        &genesis_kp,
        genesis_hash(&node_a),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(1)).unwrap(),
        Account::new([0x01; 32]),
    );
    let s2 = state_send(
        &genesis_kp,
        s1.hash(),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(2)).unwrap(),
        Account::new([0x02; 32]),
    );
    apply(&node_a, &s1);
    apply(&node_a, &s2);

    bootstrap_between(&node_a, &node_b).await;

    assert_eq!(head_of(&node_b, &genesis), head_of(&node_a, &genesis));
    assert!(block_exists(&node_b, &s1.hash()));
    assert!(block_exists(&node_b, &s2.hash()));
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let node_a = make_node(&dir_a);
    let node_b = make_node(&dir_b);
    let genesis_kp = dev_genesis_keypair();

    let s1 = state_send(
        &genesis_kp,
        genesis_hash(&node_a),
        genesis_account(&node_a),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(9)).unwrap(),
        Account::new([0x09; 32]),
    );
    apply(&node_a, &s1);

    bootstrap_between(&node_a, &node_b).await;
    let count_after_first = {
        let txn = node_b.store.tx_begin_read().unwrap();
        node_b.store.block.count(txn.raw()).unwrap()
    };

    bootstrap_between(&node_a, &node_b).await;
    let count_after_second = {
        let txn = node_b.store.tx_begin_read().unwrap();
        node_b.store.block.count(txn.raw()).unwrap()
    };
    assert_eq!(count_after_first, count_after_second);
    assert_eq!(head_of(&node_b, &genesis_account(&node_b)), Some(s1.hash()));
}

// ── Scenario: lazy bootstrap ────────────────────────────────────────────

#[tokio::test]
async fn lazy_bootstrap_walks_dependencies_from_seed() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let node_a = make_node(&dir_a);
    let node_b = make_node(&dir_b);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[7u8; 32]);
    let account1 = account_of(&key1);
    let genesis = genesis_account(&node_a);

    // A: genesis chain G -> S1 -> S2; K1 chain R1 -> R2.
    let s1 = state_send(
        &genesis_kp,
        genesis_hash(&node_a),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(10)).unwrap(),
        account1,
    );
    let r1 = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(10), s1.hash());
    let s2 = state_send(
        &genesis_kp,
        s1.hash(),
        genesis,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(25)).unwrap(),
        account1,
    );
    let r2 = state_receive(&key1, r1.hash(), account1, Amount::new(25), s2.hash());
    for block in [&s1, &r1, &s2, &r2] {
        apply(&node_a, block);
    }

    let server = Arc::new(BootstrapServer::new(
        Arc::clone(&node_a.ledger),
        NetworkId::Dev,
        16,
    ));
    let (client_stream, server_stream) = tokio::io::duplex(1024 * 1024);
    let server_task = tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            let _ = server.serve(server_stream, |_| {}).await;
        }
    });
    let mut client = BootstrapClient::new(client_stream, NetworkId::Dev);

    // B is told only the hash of R2.
    let mut lazy = weave_node::bootstrap::LazyBootstrap::new();
    lazy.seed(r2.hash());
    while let Some(pull) = lazy.next_pull() {
        let blocks = client.bulk_pull(&pull).await.unwrap();
        if blocks.is_empty() {
            assert!(lazy.mark_stopped(pull.head));
            continue;
        }
        {
            let txn = node_b.store.tx_begin_read().unwrap();
            for block in &blocks {
                lazy.process_block(
                    block,
                    |hash| node_b.store.block.exists(txn.raw(), hash).unwrap_or(false),
                    |hash| node_b.store.block.balance(txn.raw(), hash).ok().flatten(),
                );
            }
        }
        for block in blocks.into_iter().rev() {
            node_b.block_processor.add(block, BlockSource::Bootstrap);
        }
        pump(&node_b);
    }
    drop(client);
    let _ = server_task.await;

    // B eventually holds all five blocks.
    for hash in [
        genesis_hash(&node_b),
        s1.hash(),
        r1.hash(),
        s2.hash(),
        r2.hash(),
    ] {
        assert!(block_exists(&node_b, &hash), "missing {hash}");
    }
    assert_eq!(head_of(&node_b, &account1), Some(r2.hash()));
    assert_eq!(head_of(&node_b, &genesis), Some(s2.hash()));
}

// ── Rollback through the pending table ──────────────────────────────────

#[test]
fn pending_entry_tracks_send_and_receive_lifecycles() {
    let dir = tempfile::tempdir().unwrap();
    let node = make_node(&dir);
    let genesis_kp = dev_genesis_keypair();
    let key1 = keypair_from_seed(&[8u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&node),
        genesis_account(&node),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(70)).unwrap(),
        account1,
    );
    apply(&node, &send);

    let key = PendingKey::new(account1, send.hash());
    {
        let txn = node.store.tx_begin_read().unwrap();
        let pending = node.store.pending.get(txn.raw(), &key).unwrap().unwrap();
        assert_eq!(pending.amount, Amount::new(70));
    }

    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(70), send.hash());
    apply(&node, &open);
    {
        let txn = node.store.tx_begin_read().unwrap();
        assert!(node.store.pending.get(txn.raw(), &key).unwrap().is_none());
    }

    // Rolling the receive back recreates the entry.
    let mut txn = node.store.tx_begin_write(Writer::Testing).unwrap();
    node.ledger.rollback(&mut txn, &open.hash()).unwrap();
    txn.commit().unwrap();
    let txn = node.store.tx_begin_read().unwrap();
    assert!(node.store.pending.get(txn.raw(), &key).unwrap().is_some());
}
