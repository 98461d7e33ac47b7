//! Block processing pipeline.
//!
//! Concurrent ingest of blocks from the network and bootstrap into the
//! ledger. State blocks pass through batched signature verification first;
//! verified and legacy blocks are applied under a single write transaction
//! bounded by a time budget. Progress flushes dependent unchecked entries,
//! gaps store them, forks go to the election index.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use weave_blocks::Block;
use weave_consensus::ActiveElections;
use weave_ledger::{Ledger, ProcessResult};
use weave_store::{SignatureVerification, StoreError, Writer};
use weave_types::BlockHash;
use weave_utils::StatsCounter;

use crate::signature_checker::SignatureChecker;
use crate::unchecked;

/// Maximum state blocks handed to the signature checker per round.
const SIGNATURE_BATCH_SIZE: usize = 256;

/// Queue sizes beyond which `half_full` reports back-pressure.
const QUEUE_CAPACITY: usize = 64 * 1024;

/// Bounded FIFO dedup cache in front of the queues.
const UNIQUER_CAPACITY: usize = 64 * 1024;

/// Where an incoming block originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSource {
    /// Received from a peer over the realtime network.
    Live,
    /// Pulled during bootstrap.
    Bootstrap,
    /// Re-queued from the unchecked table.
    Unchecked,
    /// Locally generated; bypasses signature batch verification.
    Forced,
}

struct Queues {
    /// State blocks awaiting batched signature verification.
    state_blocks: VecDeque<Block>,
    /// Legacy blocks and state blocks that already passed verification.
    blocks: VecDeque<Block>,
    /// Local blocks processed ahead of everything else; a forced fork
    /// rolls back the competing chain side instead of raising an election.
    forced: VecDeque<Block>,
}

impl Queues {
    fn len(&self) -> usize {
        self.state_blocks.len() + self.blocks.len() + self.forced.len()
    }
}

/// FIFO-bounded set of recently enqueued hashes; re-published flood
/// traffic is dropped before it costs a queue slot.
struct Uniquer {
    seen: std::collections::HashSet<BlockHash>,
    order: VecDeque<BlockHash>,
}

impl Uniquer {
    fn new() -> Self {
        Self {
            seen: std::collections::HashSet::with_capacity(UNIQUER_CAPACITY),
            order: VecDeque::with_capacity(UNIQUER_CAPACITY),
        }
    }

    /// Returns `false` when the hash was seen recently.
    fn insert(&mut self, hash: BlockHash) -> bool {
        if self.seen.contains(&hash) {
            return false;
        }
        if self.order.len() >= UNIQUER_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(hash);
        self.order.push_back(hash);
        true
    }
}

pub struct BlockProcessor {
    ledger: Arc<Ledger>,
    active: Arc<ActiveElections>,
    checker: SignatureChecker,
    queues: Mutex<Queues>,
    uniquer: Mutex<Uniquer>,
    condition: Condvar,
    stopped: AtomicBool,
    batch_max_time: Duration,
    stats: Arc<StatsCounter>,
    observers: Mutex<Vec<Box<dyn Fn(&Block, &ProcessResult) + Send + Sync>>>,
}

/// Counter names recorded by the processor.
pub const BLOCK_PROCESSOR_COUNTERS: &[&str] = &[
    "blocks_processed",
    "blocks_progress",
    "blocks_old",
    "blocks_gap_previous",
    "blocks_gap_source",
    "blocks_bad_signature",
    "blocks_negative_spend",
    "blocks_balance_mismatch",
    "blocks_unreceivable",
    "blocks_position",
    "blocks_fork",
    "blocks_insufficient_work",
    "unchecked_flushed",
];

impl BlockProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        active: Arc<ActiveElections>,
        batch_max_time_ms: u64,
        stats: Arc<StatsCounter>,
    ) -> Self {
        let constants = ledger.constants();
        let checker = SignatureChecker::new(constants.epoch_link, constants.epoch_signer);
        Self {
            ledger,
            active,
            checker,
            queues: Mutex::new(Queues {
                state_blocks: VecDeque::new(),
                blocks: VecDeque::new(),
                forced: VecDeque::new(),
            }),
            uniquer: Mutex::new(Uniquer::new()),
            condition: Condvar::new(),
            stopped: AtomicBool::new(false),
            batch_max_time: Duration::from_millis(batch_max_time_ms),
            stats,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback fired (after commit) for every processed block.
    pub fn add_observer(
        &self,
        observer: Box<dyn Fn(&Block, &ProcessResult) + Send + Sync>,
    ) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.push(observer);
    }

    /// Enqueue a block. Returns `false` when it was dropped: duplicate of a
    /// recently seen hash, or the queue is saturated. Forced blocks bypass
    /// the dedup cache (election winners legitimately reappear).
    pub fn add(&self, block: Block, source: BlockSource) -> bool {
        if source != BlockSource::Forced {
            let mut uniquer = self.uniquer.lock().unwrap_or_else(|e| e.into_inner());
            if !uniquer.insert(block.hash()) {
                return false;
            }
        }
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if queues.len() >= QUEUE_CAPACITY {
            return false;
        }
        match (source, &block) {
            (BlockSource::Forced, _) => queues.forced.push_back(block),
            (_, Block::State(_)) => queues.state_blocks.push_back(block),
            _ => queues.blocks.push_back(block),
        }
        drop(queues);
        self.condition.notify_all();
        true
    }

    /// Back-pressure signal for bootstrap clients.
    pub fn half_full(&self) -> bool {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.len() >= QUEUE_CAPACITY / 2
    }

    pub fn queue_len(&self) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.len()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.condition.notify_all();
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Worker loop: wait for blocks, process in batches, repeat. Drains the
    /// queues before exiting on stop.
    pub fn run(&self) {
        loop {
            {
                let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                while queues.len() == 0 && !self.stopped() {
                    queues = self
                        .condition
                        .wait(queues)
                        .unwrap_or_else(|e| e.into_inner());
                }
                if queues.len() == 0 && self.stopped() {
                    return;
                }
            }
            if let Err(error) = self.process_batch() {
                // Store failures are fatal for the node.
                tracing::error!(%error, "block processor halting on store error");
                self.stop();
                return;
            }
            self.condition.notify_all();
        }
    }

    /// Block until the queues are empty (test helper).
    pub fn flush(&self) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        while queues.len() != 0 && !self.stopped() {
            queues = self
                .condition
                .wait_timeout(queues, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// One round: signature-check a batch of state blocks, then apply as
    /// many verified blocks as fit the time budget under one write
    /// transaction. Public so tests can drive the pipeline synchronously.
    pub fn process_batch(&self) -> Result<(), StoreError> {
        // Phase 1: batched signature verification outside the write lock.
        let mut verified: VecDeque<Block> = VecDeque::new();
        {
            let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            let batch: Vec<Block> = {
                let take = queues.state_blocks.len().min(SIGNATURE_BATCH_SIZE);
                queues.state_blocks.drain(..take).collect()
            };
            drop(queues);

            if !batch.is_empty() {
                let results = self.checker.verify_batch(&batch);
                for (block, ok) in batch.into_iter().zip(results) {
                    if ok {
                        verified.push_back(block);
                    } else {
                        self.stats.increment("blocks_bad_signature");
                        tracing::debug!(hash = %block.hash(), "dropping block with bad signature");
                    }
                }
            }
        }

        // Phase 2: apply under one write transaction with a time budget.
        let store = Arc::clone(self.ledger.store());
        let mut txn = store.tx_begin_write(Writer::BlockProcessor)?;
        let deadline = Instant::now() + self.batch_max_time;
        let mut processed: Vec<(Block, ProcessResult)> = Vec::new();
        let mut work: VecDeque<(Block, BlockSource)> = verified
            .into_iter()
            .map(|block| (block, BlockSource::Live))
            .collect();

        loop {
            // Forced blocks jump the line.
            if let Some(forced) = {
                let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                queues.forced.pop_front()
            } {
                work.push_front((forced, BlockSource::Forced));
            } else if work.is_empty() {
                let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                match queues.blocks.pop_front() {
                    Some(block) => work.push_back((block, BlockSource::Live)),
                    None => break,
                }
            }
            let Some((block, source)) = work.pop_front() else {
                break;
            };

            let result = self.process_one(&mut txn, &block, source, &mut work)?;
            processed.push((block, result));

            if Instant::now() >= deadline {
                // Put unfinished work back for the next round.
                let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                for (block, source) in work.drain(..).rev() {
                    match source {
                        BlockSource::Forced => queues.forced.push_front(block),
                        _ => queues.blocks.push_front(block),
                    }
                }
                break;
            }
        }
        txn.commit()?;

        // Phase 3: observers fire after the commit is visible.
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for (block, result) in &processed {
            for observer in observers.iter() {
                observer(block, result);
            }
        }
        Ok(())
    }

    fn process_one(
        &self,
        txn: &mut weave_store::WriteTransaction,
        block: &Block,
        source: BlockSource,
        work: &mut VecDeque<(Block, BlockSource)>,
    ) -> Result<ProcessResult, StoreError> {
        self.stats.increment("blocks_processed");
        let mut result = self.ledger.process(txn, block)?;

        if result == ProcessResult::Fork && source == BlockSource::Forced {
            // A forced block won its election; evict the loser chain side.
            let root_previous = block.previous();
            if let Some(conflict) = self
                .ledger
                .store()
                .block
                .successor(txn.raw(), &root_previous)?
            {
                match self.ledger.rollback(txn, &conflict) {
                    Ok(rolled) => {
                        tracing::info!(
                            winner = %block.hash(),
                            loser = %conflict,
                            count = rolled.len(),
                            "rolled back losing fork side"
                        );
                        result = self.ledger.process(txn, block)?;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "cannot roll back fork loser");
                    }
                }
            }
        }

        match result {
            ProcessResult::Progress => {
                self.stats.increment("blocks_progress");
                self.flush_unchecked(txn, &block.hash(), work)?;
            }
            ProcessResult::GapPrevious => {
                self.stats.increment("blocks_gap_previous");
                let verified = self.verified_status(block, source);
                unchecked::put(self.ledger.store(), txn, block.previous(), block, verified)?;
            }
            ProcessResult::GapSource => {
                self.stats.increment("blocks_gap_source");
                let dependency = block
                    .source()
                    .or_else(|| block.link().map(|link| link.as_block_hash()))
                    .unwrap_or(BlockHash::ZERO);
                let verified = self.verified_status(block, source);
                unchecked::put(self.ledger.store(), txn, dependency, block, verified)?;
            }
            ProcessResult::Fork => {
                self.stats.increment("blocks_fork");
                if let Err(error) = self.active.start(block.clone()) {
                    tracing::debug!(%error, hash = %block.hash(), "election not started");
                }
            }
            ProcessResult::Old => self.stats.increment("blocks_old"),
            ProcessResult::BadSignature => self.stats.increment("blocks_bad_signature"),
            ProcessResult::NegativeSpend => self.stats.increment("blocks_negative_spend"),
            ProcessResult::BalanceMismatch => self.stats.increment("blocks_balance_mismatch"),
            ProcessResult::Unreceivable => self.stats.increment("blocks_unreceivable"),
            ProcessResult::BlockPosition => self.stats.increment("blocks_position"),
            ProcessResult::InsufficientWork => self.stats.increment("blocks_insufficient_work"),
        }
        Ok(result)
    }

    fn verified_status(&self, block: &Block, source: BlockSource) -> SignatureVerification {
        match (source, block) {
            // State blocks reaching the ledger already passed the batch.
            (BlockSource::Forced, _) => SignatureVerification::Unknown,
            (_, Block::State(_)) => SignatureVerification::Valid,
            _ => SignatureVerification::Unknown,
        }
    }

    /// Queue every unchecked block that was waiting on `hash`.
    fn flush_unchecked(
        &self,
        txn: &mut weave_store::WriteTransaction,
        hash: &BlockHash,
        work: &mut VecDeque<(Block, BlockSource)>,
    ) -> Result<(), StoreError> {
        let dependents = unchecked::drain_dependents(self.ledger.store(), txn, hash)?;
        for info in dependents {
            self.stats.increment("unchecked_flushed");
            work.push_back((info.block, BlockSource::Unchecked));
        }
        Ok(())
    }
}
