//! Ledger process/rollback behavior against a real LMDB store.

use std::sync::Arc;

use weave_blocks::{Block, OpenBlock, ReceiveBlock, SendBlock, StateBlock};
use weave_crypto::{keypair_from_seed, KeyPair};
use weave_ledger::{dev_genesis_keypair, Ledger, LedgerConstants, ProcessResult, RollbackError};
use weave_store::{PendingKey, Store, Writer};
use weave_types::{Account, Amount, BlockHash, Epoch, Link};

fn setup() -> (tempfile::TempDir, Arc<Store>, Ledger) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(Store::open_with_map_size(dir.path(), 64 * 1024 * 1024).expect("store"));
    let ledger = Ledger::new(Arc::clone(&store), LedgerConstants::dev()).expect("ledger");
    (dir, store, ledger)
}

fn account_of(keypair: &KeyPair) -> Account {
    Account::new(*keypair.public.as_bytes())
}

fn genesis_hash(ledger: &Ledger) -> BlockHash {
    ledger.constants().genesis_block.hash()
}

/// State send: balance drops to `new_balance`, link names the destination.
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

/// State receive/open: balance rises to `new_balance`, link names the source.
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

fn process(ledger: &Ledger, store: &Store, block: &Block) -> ProcessResult {
    let mut txn = store.tx_begin_write(Writer::Testing).unwrap();
    let result = ledger.process(&mut txn, block).unwrap();
    txn.commit().unwrap();
    result
}

/// Total circulating value: live balances plus unconsumed pending.
fn total_supply(ledger: &Ledger, store: &Store) -> Amount {
    let txn = store.tx_begin_read().unwrap();
    let mut total = Amount::ZERO;
    for entry in store.account.iter(txn.raw()).unwrap() {
        let (_, info) = entry.unwrap();
        total = total.checked_add(info.balance).unwrap();
    }
    total
        .checked_add(store.pending.total_amount(txn.raw()).unwrap())
        .unwrap()
}

// ── Genesis ─────────────────────────────────────────────────────────────

#[test]
fn genesis_is_seeded_once() {
    let (_dir, store, ledger) = setup();
    let genesis = genesis_hash(&ledger);
    let genesis_account = ledger.constants().genesis_account;

    let txn = store.tx_begin_read().unwrap();
    assert_eq!(
        ledger.balance(txn.raw(), &genesis).unwrap(),
        Some(Amount::MAX_SUPPLY)
    );
    assert_eq!(
        ledger.latest(txn.raw(), &genesis_account).unwrap(),
        Some(genesis)
    );
    assert_eq!(ledger.weight(&genesis_account), Amount::MAX_SUPPLY);
    assert_eq!(
        store
            .confirmation_height
            .get(txn.raw(), &genesis_account)
            .unwrap()
            .unwrap()
            .height,
        1
    );
}

#[test]
fn reopening_does_not_reseed() {
    let dir = tempfile::tempdir().unwrap();
    let genesis_count = {
        let store =
            Arc::new(Store::open_with_map_size(dir.path(), 64 * 1024 * 1024).unwrap());
        let _ledger = Ledger::new(Arc::clone(&store), LedgerConstants::dev()).unwrap();
        let txn = store.tx_begin_read().unwrap();
        store.block.count(txn.raw()).unwrap()
    };
    let store = Arc::new(Store::open_with_map_size(dir.path(), 64 * 1024 * 1024).unwrap());
    let ledger = Ledger::new(Arc::clone(&store), LedgerConstants::dev()).unwrap();
    let txn = store.tx_begin_read().unwrap();
    assert_eq!(store.block.count(txn.raw()).unwrap(), genesis_count);
    assert_eq!(ledger.weight(&ledger.constants().genesis_account), Amount::MAX_SUPPLY);
}

// ── Genesis receive scenario ────────────────────────────────────────────

#[test]
fn send_then_open_moves_value() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[1u8; 32]);
    let account1 = account_of(&key1);

    let send_balance = Amount::MAX_SUPPLY.checked_sub(Amount::new(100)).unwrap();
    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        send_balance,
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);

    // Pending entry exists until received.
    {
        let txn = store.tx_begin_read().unwrap();
        let pending = store
            .pending
            .get(txn.raw(), &PendingKey::new(account1, send.hash()))
            .unwrap()
            .unwrap();
        assert_eq!(pending.amount, Amount::new(100));
        assert_eq!(pending.source, genesis_account);
    }

    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(100), send.hash());
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    let txn = store.tx_begin_read().unwrap();
    assert_eq!(
        ledger.balance(txn.raw(), &send.hash()).unwrap(),
        Some(send_balance)
    );
    assert_eq!(
        ledger.balance(txn.raw(), &open.hash()).unwrap(),
        Some(Amount::new(100))
    );
    assert_eq!(store.pending.count(txn.raw()).unwrap(), 0);
    assert_eq!(ledger.weight(&account1), Amount::new(100));
    assert_eq!(ledger.weight(&genesis_account), send_balance);
    assert_eq!(ledger.amount(txn.raw(), &send.hash()).unwrap(), Some(Amount::new(100)));
    assert_eq!(ledger.amount(txn.raw(), &open.hash()).unwrap(), Some(Amount::new(100)));
    // Successor link from genesis to the send.
    assert_eq!(
        store.block.successor(txn.raw(), &genesis_hash(&ledger)).unwrap(),
        Some(send.hash())
    );
}

// ── Error paths ─────────────────────────────────────────────────────────

#[test]
fn duplicate_block_is_old() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(1)).unwrap(),
        Account::new([0x01; 32]),
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Old);
}

#[test]
fn resubmitted_block_with_forged_signature_is_bad_signature() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(2)).unwrap(),
        Account::new([0x01; 32]),
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);

    // The hash does not cover the signature, so this resubmission collides
    // with the stored block; it must still be rejected for its signature,
    // not silently dropped as a duplicate.
    let mut forged = send.clone();
    forged.set_signature(weave_types::Signature::new([0x77; 64]));
    assert_eq!(forged.hash(), send.hash());
    assert_eq!(process(&ledger, &store, &forged), ProcessResult::BadSignature);
}

#[test]
fn second_send_from_same_previous_is_fork() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;

    let first = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(100)).unwrap(),
        Account::new([0x01; 32]),
    );
    let second = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(200)).unwrap(),
        Account::new([0x02; 32]),
    );
    assert_eq!(process(&ledger, &store, &first), ProcessResult::Progress);
    assert_eq!(process(&ledger, &store, &second), ProcessResult::Fork);

    let txn = store.tx_begin_read().unwrap();
    assert_eq!(
        ledger.latest(txn.raw(), &genesis_account).unwrap(),
        Some(first.hash())
    );
}

#[test]
fn unknown_previous_is_gap() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;

    let send = state_send(
        &genesis_kp,
        BlockHash::new([0xEE; 32]),
        genesis_account,
        Amount::new(5),
        Account::new([0x01; 32]),
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::GapPrevious);
}

#[test]
fn unknown_source_is_gap_source() {
    let (_dir, store, ledger) = setup();
    let key1 = keypair_from_seed(&[1u8; 32]);
    let account1 = account_of(&key1);

    let open = state_receive(
        &key1,
        BlockHash::ZERO,
        account1,
        Amount::new(100),
        BlockHash::new([0xAB; 32]),
    );
    assert_eq!(process(&ledger, &store, &open), ProcessResult::GapSource);
}

#[test]
fn double_receive_is_unreceivable() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[1u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(10)).unwrap(),
        account1,
    );
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(10), send.hash());
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    // A second receive of the same source from the new head.
    let double = state_receive(
        &key1,
        open.hash(),
        account1,
        Amount::new(20),
        send.hash(),
    );
    assert_eq!(process(&ledger, &store, &double), ProcessResult::Unreceivable);
}

#[test]
fn wrong_receive_amount_is_balance_mismatch() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[1u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(50)).unwrap(),
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);

    // Claims 60 but the pending entry is 50.
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(60), send.hash());
    assert_eq!(process(&ledger, &store, &open), ProcessResult::BalanceMismatch);
}

#[test]
fn tampered_signature_is_rejected() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;

    let mut send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(1)).unwrap(),
        Account::new([0x01; 32]),
    );
    send.set_signature(weave_types::Signature::new([0x55; 64]));
    assert_eq!(process(&ledger, &store, &send), ProcessResult::BadSignature);
}

// ── Legacy blocks ───────────────────────────────────────────────────────

#[test]
fn legacy_send_open_receive_cycle() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[2u8; 32]);
    let account1 = account_of(&key1);

    let send1 = Block::Send(SendBlock::new(
        genesis_hash(&ledger),
        account1,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(300)).unwrap(),
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &send1), ProcessResult::Progress);

    let open = Block::Open(OpenBlock::new(
        send1.hash(),
        account1,
        account1,
        &key1.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    let send2 = Block::Send(SendBlock::new(
        send1.hash(),
        account1,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(500)).unwrap(),
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &send2), ProcessResult::Progress);

    let receive = Block::Receive(ReceiveBlock::new(
        open.hash(),
        send2.hash(),
        &key1.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &receive), ProcessResult::Progress);

    let txn = store.tx_begin_read().unwrap();
    assert_eq!(
        ledger.balance(txn.raw(), &receive.hash()).unwrap(),
        Some(Amount::new(500))
    );
    drop(txn);
    assert_eq!(ledger.weight(&account1), Amount::new(500));
    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);
}

#[test]
fn legacy_send_increasing_balance_is_negative_spend() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();

    let send = Block::Send(SendBlock::new(
        genesis_hash(&ledger),
        Account::new([0x01; 32]),
        Amount::MAX_SUPPLY,
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &send), ProcessResult::NegativeSpend);
}

// ── Epoch blocks ────────────────────────────────────────────────────────

#[test]
fn epoch_upgrade_then_legacy_rejected() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let epoch_link = ledger.constants().epoch_link;

    // Epoch block on genesis, signed by the epoch signer (genesis itself).
    let epoch = Block::State(StateBlock::new(
        genesis_account,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY,
        epoch_link,
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &epoch), ProcessResult::Progress);

    {
        let txn = store.tx_begin_read().unwrap();
        let info = store.account.get(txn.raw(), &genesis_account).unwrap().unwrap();
        assert_eq!(info.epoch, Epoch::Epoch1);
        // No value moved, weight unchanged.
        assert_eq!(ledger.weight(&genesis_account), Amount::MAX_SUPPLY);
    }

    // Legacy blocks are no longer accepted on the upgraded account.
    let legacy = Block::Send(SendBlock::new(
        epoch.hash(),
        Account::new([0x01; 32]),
        Amount::MAX_SUPPLY.checked_sub(Amount::new(1)).unwrap(),
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &legacy), ProcessResult::BlockPosition);
}

#[test]
fn epoch_block_with_changed_representative_rejected() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let other_kp = keypair_from_seed(&[9u8; 32]);

    // Epoch blocks signed by the epoch signer must not move the
    // representative. Genesis signs for itself (any epoch block there
    // verifies as signed-by-account), so pin the epoch path on a second
    // account.
    let key1 = keypair_from_seed(&[3u8; 32]);
    let account1 = account_of(&key1);
    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(5)).unwrap(),
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(5), send.hash());
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    // Epoch upgrade for account1 signed by genesis, but with the wrong rep.
    let bad_epoch = Block::State(StateBlock::new(
        account1,
        open.hash(),
        account_of(&other_kp),
        Amount::new(5),
        ledger.constants().epoch_link,
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &bad_epoch), ProcessResult::BlockPosition);

    // With the representative preserved it succeeds.
    let good_epoch = Block::State(StateBlock::new(
        account1,
        open.hash(),
        account1,
        Amount::new(5),
        ledger.constants().epoch_link,
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &good_epoch), ProcessResult::Progress);
}

#[test]
fn epoch1_pending_rejects_legacy_receive() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[4u8; 32]);
    let account1 = account_of(&key1);

    // Upgrade genesis to epoch 1, then send from it.
    let epoch = Block::State(StateBlock::new(
        genesis_account,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY,
        ledger.constants().epoch_link,
        &genesis_kp.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &epoch), ProcessResult::Progress);
    let send = state_send(
        &genesis_kp,
        epoch.hash(),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(7)).unwrap(),
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);

    // Legacy open cannot consume the epoch-1 pending entry.
    let legacy_open = Block::Open(OpenBlock::new(send.hash(), account1, account1, &key1.private, 0));
    assert_eq!(process(&ledger, &store, &legacy_open), ProcessResult::Unreceivable);

    // A state open can.
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(7), send.hash());
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);
}

// ── Rollback ────────────────────────────────────────────────────────────

#[test]
fn rollback_send_removes_pending() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[5u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(25)).unwrap(),
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);

    let mut txn = store.tx_begin_write(Writer::Testing).unwrap();
    let rolled = ledger.rollback(&mut txn, &send.hash()).unwrap();
    txn.commit().unwrap();
    assert_eq!(rolled, vec![send.hash()]);

    let txn = store.tx_begin_read().unwrap();
    assert_eq!(
        ledger.latest(txn.raw(), &genesis_account).unwrap(),
        Some(genesis_hash(&ledger))
    );
    assert_eq!(store.pending.count(txn.raw()).unwrap(), 0);
    assert!(!store.block.exists(txn.raw(), &send.hash()).unwrap());
    assert_eq!(ledger.weight(&genesis_account), Amount::MAX_SUPPLY);
    // Successor cleared on the new head.
    assert_eq!(
        store.block.successor(txn.raw(), &genesis_hash(&ledger)).unwrap(),
        None
    );
}

#[test]
fn rollback_receive_recreates_pending() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[6u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(40)).unwrap(),
        account1,
    );
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(40), send.hash());
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    let mut txn = store.tx_begin_write(Writer::Testing).unwrap();
    let rolled = ledger.rollback(&mut txn, &open.hash()).unwrap();
    txn.commit().unwrap();
    assert_eq!(rolled, vec![open.hash()]);

    let txn = store.tx_begin_read().unwrap();
    let pending = store
        .pending
        .get(txn.raw(), &PendingKey::new(account1, send.hash()))
        .unwrap()
        .unwrap();
    assert_eq!(pending.amount, Amount::new(40));
    assert_eq!(pending.source, genesis_account);
    // The account is gone entirely — its only block was the open.
    assert_eq!(ledger.latest(txn.raw(), &account1).unwrap(), None);
    assert_eq!(ledger.weight(&account1), Amount::ZERO);
}

#[test]
fn rollback_send_cascades_through_receiver() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[7u8; 32]);
    let account1 = account_of(&key1);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(60)).unwrap(),
        account1,
    );
    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(60), send.hash());
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);

    // Rolling back the send must also unwind the receive that consumed it.
    let mut txn = store.tx_begin_write(Writer::Testing).unwrap();
    let rolled = ledger.rollback(&mut txn, &send.hash()).unwrap();
    txn.commit().unwrap();
    assert!(rolled.contains(&send.hash()));
    assert!(rolled.contains(&open.hash()));

    let txn = store.tx_begin_read().unwrap();
    assert!(!store.block.exists(txn.raw(), &send.hash()).unwrap());
    assert!(!store.block.exists(txn.raw(), &open.hash()).unwrap());
    assert_eq!(store.pending.count(txn.raw()).unwrap(), 0);
    drop(txn);
    assert_eq!(ledger.weight(&genesis_account), Amount::MAX_SUPPLY);
    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);
}

#[test]
fn rollback_of_cemented_block_refused() {
    let (_dir, store, ledger) = setup();
    let genesis_account = ledger.constants().genesis_account;

    // Genesis is cemented at height 1 by seeding.
    let mut txn = store.tx_begin_write(Writer::Testing).unwrap();
    let result = ledger.rollback(&mut txn, &genesis_hash(&ledger));
    assert!(matches!(result, Err(RollbackError::Cemented { .. })));
    drop(txn);

    let txn = store.tx_begin_read().unwrap();
    assert!(store.block.exists(txn.raw(), &genesis_hash(&ledger)).unwrap());
    assert_eq!(
        ledger.latest(txn.raw(), &genesis_account).unwrap(),
        Some(genesis_hash(&ledger))
    );
}

// ── Supply conservation ─────────────────────────────────────────────────

#[test]
fn supply_is_conserved_across_operations() {
    let (_dir, store, ledger) = setup();
    let genesis_kp = dev_genesis_keypair();
    let genesis_account = ledger.constants().genesis_account;
    let key1 = keypair_from_seed(&[8u8; 32]);
    let account1 = account_of(&key1);

    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);

    let send = state_send(
        &genesis_kp,
        genesis_hash(&ledger),
        genesis_account,
        Amount::MAX_SUPPLY.checked_sub(Amount::new(123)).unwrap(),
        account1,
    );
    assert_eq!(process(&ledger, &store, &send), ProcessResult::Progress);
    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);

    let open = state_receive(&key1, BlockHash::ZERO, account1, Amount::new(123), send.hash());
    assert_eq!(process(&ledger, &store, &open), ProcessResult::Progress);
    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);

    let change = Block::State(StateBlock::new(
        account1,
        open.hash(),
        genesis_account,
        Amount::new(123),
        Link::ZERO,
        &key1.private,
        0,
    ));
    assert_eq!(process(&ledger, &store, &change), ProcessResult::Progress);
    assert_eq!(total_supply(&ledger, &store), Amount::MAX_SUPPLY);
    // Weight moved to the new representative.
    assert_eq!(ledger.weight(&account1), Amount::ZERO);
    assert_eq!(ledger.weight(&genesis_account), Amount::MAX_SUPPLY);
}
