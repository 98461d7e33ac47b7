//! Lazy bootstrap — hash walking from a seed instead of a frontier scan.
//!
//! Each received block is inspected for unknown dependencies (`previous`,
//! legacy `source`, or the state `link` when the balance says it is a
//! source). Unknowns become further pulls. The walk is bounded per request
//! (`lazy_max_pull_blocks`) and per attempt (`lazy_max_stopped`).

use std::collections::{HashMap, HashSet, VecDeque};

use weave_blocks::Block;
use weave_types::{Amount, BlockHash};

use crate::bootstrap::pulls::PullInfo;

/// Default cap on blocks per lazy pull request.
pub const LAZY_MAX_PULL_BLOCKS: u32 = 512;

/// Default cap on dead-end hashes per attempt.
pub const LAZY_MAX_STOPPED: usize = 512;

pub struct LazyBootstrap {
    /// Hashes queued for pulling.
    pending: VecDeque<BlockHash>,
    /// Everything ever enqueued or observed, to keep the walk acyclic.
    known: HashSet<BlockHash>,
    /// State-block links whose send/receive classification is blocked on an
    /// unknown previous block: `previous -> [(link, balance)]`. When the
    /// previous arrives its balance settles the question.
    state_unknown: HashMap<BlockHash, Vec<(BlockHash, Amount)>>,
    /// Hashes whose pulls dead-ended.
    stopped: HashSet<BlockHash>,
    max_pull_blocks: u32,
    max_stopped: usize,
}

impl LazyBootstrap {
    pub fn new() -> Self {
        Self::with_limits(LAZY_MAX_PULL_BLOCKS, LAZY_MAX_STOPPED)
    }

    pub fn with_limits(max_pull_blocks: u32, max_stopped: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            known: HashSet::new(),
            state_unknown: HashMap::new(),
            stopped: HashSet::new(),
            max_pull_blocks,
            max_stopped,
        }
    }

    /// Seed the walk with a hash to fetch.
    pub fn seed(&mut self, hash: BlockHash) -> bool {
        if hash.is_zero() || !self.known.insert(hash) {
            return false;
        }
        self.pending.push_back(hash);
        true
    }

    /// Next pull request, if any.
    pub fn next_pull(&mut self) -> Option<PullInfo> {
        let hash = self.pending.pop_front()?;
        Some(PullInfo::lazy(hash, self.max_pull_blocks))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record a pull that returned nothing. The attempt aborts once too
    /// many hashes dead-end.
    pub fn mark_stopped(&mut self, hash: BlockHash) -> bool {
        self.stopped.insert(hash);
        self.stopped.len() <= self.max_stopped
    }

    pub fn stopped_count(&self) -> usize {
        self.stopped.len()
    }

    /// Inspect a received block and enqueue its unknown dependencies.
    ///
    /// `known_block` answers whether a hash is already in the local ledger;
    /// `balance_of` resolves a hash to its on-ledger balance when known.
    pub fn process_block(
        &mut self,
        block: &Block,
        known_block: impl Fn(&BlockHash) -> bool,
        balance_of: impl Fn(&BlockHash) -> Option<Amount>,
    ) {
        let hash = block.hash();
        self.known.insert(hash);

        let previous = block.previous();
        if !previous.is_zero() && !known_block(&previous) {
            self.seed(previous);
        }

        // Legacy receives carry an explicit source.
        if let Some(source) = block.source() {
            if !source.is_zero() && !known_block(&source) {
                self.seed(source);
            }
        }

        // State blocks: the link is a source only when the balance rose.
        if let Block::State(state) = block {
            if !state.link.is_zero() {
                let link_hash = state.link.as_block_hash();
                let previous_balance = if state.previous.is_zero() {
                    Some(Amount::ZERO)
                } else {
                    balance_of(&state.previous)
                };
                match previous_balance {
                    Some(previous_balance) => {
                        if state.balance > previous_balance && !known_block(&link_hash) {
                            self.seed(link_hash);
                        }
                    }
                    None => {
                        // Cannot classify yet; park it until the previous
                        // block arrives through this same walk.
                        self.state_unknown
                            .entry(state.previous)
                            .or_default()
                            .push((link_hash, state.balance));
                    }
                }
            }
        }

        // This block may itself be the previous another link was waiting on.
        if let Some(parked) = self.state_unknown.remove(&hash) {
            if let Some(balance) = block_balance(block) {
                for (link_hash, child_balance) in parked {
                    if child_balance > balance && !known_block(&link_hash) {
                        self.seed(link_hash);
                    }
                }
            }
        }
    }

    /// Links still unclassified at the end of the attempt.
    pub fn unclassified_count(&self) -> usize {
        self.state_unknown.values().map(Vec::len).sum()
    }
}

impl Default for LazyBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

/// Balance carried in the block body, when the type has one.
fn block_balance(block: &Block) -> Option<Amount> {
    block.balance_field()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_blocks::{ReceiveBlock, SendBlock, StateBlock};
    use weave_types::{Account, Link, Signature};

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn state(previous: BlockHash, balance: u128, link: BlockHash) -> Block {
        Block::State(StateBlock {
            account: Account::new([0x01; 32]),
            previous,
            representative: Account::new([0x02; 32]),
            balance: Amount::new(balance),
            link: Link::from(link),
            signature: Signature::new([1u8; 64]),
            work: 0,
        })
    }

    #[test]
    fn seed_dedupes() {
        let mut lazy = LazyBootstrap::new();
        assert!(lazy.seed(hash(1)));
        assert!(!lazy.seed(hash(1)));
        assert!(!lazy.seed(BlockHash::ZERO));
        assert_eq!(lazy.pending_count(), 1);
    }

    #[test]
    fn unknown_previous_enqueued() {
        let mut lazy = LazyBootstrap::new();
        let block = state(hash(9), 100, BlockHash::ZERO);
        lazy.process_block(&block, |_| false, |_| Some(Amount::new(100)));
        assert_eq!(lazy.next_pull().unwrap().head, hash(9));
    }

    #[test]
    fn legacy_source_enqueued() {
        let mut lazy = LazyBootstrap::new();
        let block = Block::Receive(ReceiveBlock {
            previous: hash(1),
            source: hash(2),
            signature: Signature::new([1u8; 64]),
            work: 0,
        });
        lazy.process_block(&block, |h| *h == hash(1), |_| None);
        // Only the unknown source is queued.
        assert_eq!(lazy.pending_count(), 1);
        assert_eq!(lazy.next_pull().unwrap().head, hash(2));
    }

    #[test]
    fn send_link_is_not_a_dependency() {
        let mut lazy = LazyBootstrap::new();
        // Balance dropped from 100 to 40: the link names a destination.
        let block = state(hash(1), 40, hash(7));
        lazy.process_block(&block, |h| *h == hash(1), |_| Some(Amount::new(100)));
        assert_eq!(lazy.pending_count(), 0);
    }

    #[test]
    fn receive_link_is_a_dependency() {
        let mut lazy = LazyBootstrap::new();
        // Balance rose from 40 to 100: the link names a source block.
        let block = state(hash(1), 100, hash(7));
        lazy.process_block(&block, |h| *h == hash(1), |_| Some(Amount::new(40)));
        assert_eq!(lazy.next_pull().unwrap().head, hash(7));
    }

    #[test]
    fn unknown_previous_parks_link_until_resolved() {
        let mut lazy = LazyBootstrap::new();
        // previous unknown: cannot classify the link yet.
        let child = state(hash(1), 100, hash(7));
        lazy.process_block(&child, |_| false, |_| None);
        assert_eq!(lazy.unclassified_count(), 1);
        // The previous pull was enqueued; the link was not.
        assert_eq!(lazy.pending_count(), 1);

        // The previous arrives with balance 40 < 100: a receive, so the
        // link becomes a pull.
        let previous = Block::Send(SendBlock {
            previous: hash(0x55),
            destination: Account::new([0x03; 32]),
            balance: Amount::new(40),
            signature: Signature::new([1u8; 64]),
            work: 0,
        });
        // Force the parked map key to match: the child named hash(1).
        // (Construct the parent so its hash is irrelevant; we resolve by
        // the map key, which is what `process_block` removes.)
        let parked = lazy.state_unknown.remove(&hash(1)).unwrap();
        lazy.state_unknown.insert(previous.hash(), parked);
        lazy.process_block(&previous, |_| false, |_| None);
        assert_eq!(lazy.unclassified_count(), 0);
        assert!(lazy.known.contains(&hash(7)));
    }

    #[test]
    fn stopped_cap_enforced() {
        let mut lazy = LazyBootstrap::with_limits(512, 2);
        assert!(lazy.mark_stopped(hash(1)));
        assert!(lazy.mark_stopped(hash(2)));
        assert!(!lazy.mark_stopped(hash(3)));
    }
}
