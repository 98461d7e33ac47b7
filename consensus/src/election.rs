//! A single election: the set of blocks competing for one chain position.

use std::collections::HashMap;

use weave_blocks::Block;
use weave_types::{BlockHash, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    /// Collecting votes.
    Active,
    /// A winner reached quorum; awaiting cementation.
    Confirmed,
}

/// One contested chain position.
#[derive(Clone, Debug)]
pub struct Election {
    /// All blocks observed for this position, keyed by hash.
    blocks: HashMap<BlockHash, Block>,
    /// The current leader (first block seen until votes say otherwise).
    winner: BlockHash,
    pub state: ElectionState,
    pub started_at: Timestamp,
}

impl Election {
    pub fn new(block: Block, now: Timestamp) -> Self {
        let winner = block.hash();
        let mut blocks = HashMap::new();
        blocks.insert(winner, block);
        Self {
            blocks,
            winner,
            state: ElectionState::Active,
            started_at: now,
        }
    }

    /// Register a competing block for the same position. Returns `false`
    /// if it was already known.
    pub fn insert_block(&mut self, block: Block) -> bool {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.blocks.insert(hash, block);
        true
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn winner(&self) -> &BlockHash {
        &self.winner
    }

    /// The consensus layer observed quorum for `hash`; mark it the winner.
    /// Returns `false` if the hash is not part of this election.
    pub fn confirm(&mut self, hash: &BlockHash) -> bool {
        if !self.blocks.contains_key(hash) {
            return false;
        }
        self.winner = *hash;
        self.state = ElectionState::Confirmed;
        true
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ElectionState::Confirmed
    }

    pub fn winner_block(&self) -> Option<&Block> {
        self.blocks.get(&self.winner)
    }
}
