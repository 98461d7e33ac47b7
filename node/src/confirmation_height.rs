//! Confirmation-height processor — cements confirmed chains monotonically.
//!
//! Receives hashes deemed confirmed by the election subsystem. For each, it
//! walks the owning chain back to the previously cemented block, first
//! cementing the source chains of any receive in that range (depth-first
//! with an explicit stack — long chains must not recurse), then advances
//! `confirmation_height` for every account touched under one write
//! transaction and fires observers in commit order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weave_blocks::Block;
use weave_ledger::Ledger;
use weave_store::{ConfirmationHeightInfo, StoreError, Writer};
use weave_types::{Account, Amount, BlockHash};
use weave_utils::StatsCounter;

/// Observer fired once per newly cemented block, in cement order:
/// `(block, account, amount, is_send)`.
pub type CementObserver = Box<dyn Fn(&Block, &Account, &Amount, bool) + Send + Sync>;

/// One account range to cement: hashes in ascending height order.
struct CementBatch {
    account: Account,
    hashes: Vec<BlockHash>,
    new_height: u64,
    frontier: BlockHash,
}

pub struct ConfirmationHeightProcessor {
    ledger: Arc<Ledger>,
    stopped: AtomicBool,
    observers: Mutex<Vec<CementObserver>>,
    /// Confirmed target vanished between scheduling and cementing.
    invalid_block: AtomicU64,
    batch_min_time: Duration,
    stats: Arc<StatsCounter>,
}

impl ConfirmationHeightProcessor {
    pub fn new(ledger: Arc<Ledger>, batch_min_time_ms: u64, stats: Arc<StatsCounter>) -> Self {
        Self {
            ledger,
            stopped: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
            invalid_block: AtomicU64::new(0),
            batch_min_time: Duration::from_millis(batch_min_time_ms),
            stats,
        }
    }

    pub fn add_observer(&self, observer: CementObserver) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.push(observer);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn invalid_block_count(&self) -> u64 {
        self.invalid_block.load(Ordering::Relaxed)
    }

    /// Worker loop consuming confirmed hashes from the election index.
    pub fn run(&self, receiver: Receiver<BlockHash>) {
        while !self.stopped.load(Ordering::SeqCst) {
            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(hash) => {
                    if let Err(error) = self.process(&hash) {
                        tracing::error!(%error, "confirmation height processor halting");
                        self.stop();
                        return;
                    }
                    // Pace write batches so the block processor is not
                    // starved of the write lock.
                    std::thread::sleep(self.batch_min_time);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Cement everything at or below `target`, including receive-source
    /// dependencies on other chains. Returns the number of newly cemented
    /// blocks.
    pub fn process(&self, target: &BlockHash) -> Result<u64, StoreError> {
        let store = Arc::clone(self.ledger.store());
        let mut txn = store.tx_begin_write(Writer::ConfirmationHeight)?;

        if !store.block.exists(txn.raw(), target)? {
            // Rolled back between confirmation and cementing.
            self.invalid_block.fetch_add(1, Ordering::Relaxed);
            self.stats.increment("confirmation_invalid_block");
            tracing::warn!(%target, "confirmed block no longer exists");
            return Ok(0);
        }

        let batches = self.collect_batches(&mut txn, target)?;

        let mut cemented: Vec<(Block, Account, Amount, bool)> = Vec::new();
        for batch in &batches {
            store.confirmation_height.put(
                txn.raw_mut(),
                &batch.account,
                &ConfirmationHeightInfo {
                    height: batch.new_height,
                    frontier: batch.frontier,
                },
            )?;
            for hash in &batch.hashes {
                let Some(stored) = store.block.get(txn.raw(), hash)? else {
                    continue;
                };
                let amount = self
                    .ledger
                    .amount(txn.raw(), hash)?
                    .unwrap_or(Amount::ZERO);
                let is_send = self.ledger.is_send(txn.raw(), hash)?;
                cemented.push((stored.block, batch.account, amount, is_send));
            }
        }
        txn.commit()?;

        let count = cemented.len() as u64;
        self.stats.add("blocks_cemented", count);

        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for (block, account, amount, is_send) in &cemented {
            for observer in observers.iter() {
                observer(block, account, amount, *is_send);
            }
        }
        Ok(count)
    }

    /// Depth-first collection over the dependency graph. A chain range is
    /// only emitted once every receive source inside it is scheduled ahead
    /// of it, so cement order respects cross-chain causality.
    fn collect_batches(
        &self,
        txn: &mut weave_store::WriteTransaction,
        target: &BlockHash,
    ) -> Result<Vec<CementBatch>, StoreError> {
        let store = self.ledger.store();
        let mut batches: Vec<CementBatch> = Vec::new();
        let mut scheduled: HashSet<BlockHash> = HashSet::new();
        let mut stack: Vec<BlockHash> = vec![*target];

        while let Some(&top) = stack.last() {
            if scheduled.contains(&top) {
                stack.pop();
                continue;
            }
            let Some(top_stored) = store.block.get(txn.raw(), &top)? else {
                self.invalid_block.fetch_add(1, Ordering::Relaxed);
                stack.pop();
                continue;
            };
            let account = top_stored.sideband.account;
            let confirmed_height = store
                .confirmation_height
                .get(txn.raw(), &account)?
                .map(|info| info.height)
                .unwrap_or(0);
            if top_stored.sideband.height <= confirmed_height {
                scheduled.insert(top);
                stack.pop();
                continue;
            }

            // Walk down to the cemented base, collecting the range and any
            // uncemented receive sources.
            let mut range: Vec<BlockHash> = Vec::new();
            let mut dependencies: Vec<BlockHash> = Vec::new();
            let mut current = top;
            while !current.is_zero() {
                if scheduled.contains(&current) {
                    // Already part of an earlier batch (receive of a send
                    // lower in this same chain).
                    break;
                }
                let Some(stored) = store.block.get(txn.raw(), &current)? else {
                    break;
                };
                if stored.sideband.height <= confirmed_height {
                    break;
                }
                if let Some(source) = receive_source(&stored.block) {
                    if !scheduled.contains(&source)
                        && self.needs_cementing(txn, &source)?
                    {
                        dependencies.push(source);
                    }
                }
                range.push(current);
                current = stored.block.previous();
            }

            if dependencies.is_empty() {
                range.reverse();
                for hash in &range {
                    scheduled.insert(*hash);
                }
                batches.push(CementBatch {
                    account,
                    new_height: top_stored.sideband.height,
                    frontier: top,
                    hashes: range,
                });
                stack.pop();
            } else {
                // Sources first; `top` stays on the stack for a re-walk.
                stack.extend(dependencies);
            }
        }
        Ok(batches)
    }

    /// Whether `hash` exists and sits above its account's cemented prefix.
    fn needs_cementing(
        &self,
        txn: &weave_store::WriteTransaction,
        hash: &BlockHash,
    ) -> Result<bool, StoreError> {
        let store = self.ledger.store();
        let Some(stored) = store.block.get(txn.raw(), hash)? else {
            return Ok(false);
        };
        let confirmed_height = store
            .confirmation_height
            .get(txn.raw(), &stored.sideband.account)?
            .map(|info| info.height)
            .unwrap_or(0);
        Ok(stored.sideband.height > confirmed_height)
    }
}

/// The source hash a block's cementing depends on, if any.
fn receive_source(block: &Block) -> Option<BlockHash> {
    match block {
        Block::Receive(receive) => Some(receive.source),
        Block::Open(open) => Some(open.source),
        // State receives are recognized by a non-zero, non-epoch link; the
        // cheap filter here is refined by `needs_cementing` (a send link
        // names an account, which is almost never a block hash in store).
        Block::State(state) if !state.link.is_zero() => Some(state.link.as_block_hash()),
        _ => None,
    }
}
