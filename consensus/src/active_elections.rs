//! Active transactions index — tracks in-flight elections keyed by
//! qualified root.
//!
//! The core contract is narrow: `start(block)`, `active(block)`,
//! `erase(block)`, fork registration, and surfacing winners to the
//! confirmation-height processor. Quorum computation and vote aggregation
//! live in the consensus layer above.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use weave_blocks::Block;
use weave_types::{BlockHash, Root, Timestamp};

use crate::election::Election;
use crate::ConsensusError;

/// Identifies a chain position: the pair of `previous` and the PoW root.
/// Two blocks with the same qualified root compete for the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedRoot {
    pub previous: BlockHash,
    pub root: Root,
}

impl QualifiedRoot {
    pub fn of(block: &Block) -> Self {
        Self {
            previous: block.previous(),
            root: block.root(),
        }
    }
}

/// How many decided positions are remembered before the oldest is evicted.
const RECENTLY_DECIDED_CAPACITY: usize = 65_536;

struct State {
    roots: HashMap<QualifiedRoot, Election>,
    /// Recently decided positions in decision order. Late votes for the
    /// winner (hash lookup) and late fork blocks for an already-decided
    /// slot (root lookup) must not restart an election; without this the
    /// node would re-elect blocks it just cemented whenever stragglers
    /// arrive.
    decided: VecDeque<(QualifiedRoot, BlockHash)>,
    decided_hashes: HashSet<BlockHash>,
    decided_roots: HashSet<QualifiedRoot>,
}

impl State {
    /// Record a decided position, evicting the oldest past capacity.
    fn remember_decision(&mut self, qualified_root: QualifiedRoot, winner: BlockHash) {
        if !self.decided_hashes.insert(winner) {
            return;
        }
        self.decided_roots.insert(qualified_root);
        self.decided.push_back((qualified_root, winner));
        if self.decided.len() > RECENTLY_DECIDED_CAPACITY {
            if let Some((old_root, old_winner)) = self.decided.pop_front() {
                self.decided_hashes.remove(&old_winner);
                self.decided_roots.remove(&old_root);
            }
        }
    }

    fn is_decided(&self, qualified_root: &QualifiedRoot, hash: &BlockHash) -> bool {
        self.decided_hashes.contains(hash) || self.decided_roots.contains(qualified_root)
    }
}

/// Index of in-flight elections.
pub struct ActiveElections {
    state: Mutex<State>,
    max_elections: usize,
    /// Winners are handed to the confirmation-height processor here.
    /// (Wrapped so the index stays `Sync`; sends are rare and short.)
    confirmed: Mutex<Sender<BlockHash>>,
}

impl ActiveElections {
    pub fn new(max_elections: usize, confirmed: Sender<BlockHash>) -> Self {
        Self {
            state: Mutex::new(State {
                roots: HashMap::new(),
                decided: VecDeque::new(),
                decided_hashes: HashSet::new(),
                decided_roots: HashSet::new(),
            }),
            max_elections,
            confirmed: Mutex::new(confirmed),
        }
    }

    /// Begin (or join) the election for this block's chain position. A
    /// no-op for positions that were already decided recently.
    pub fn start(&self, block: Block) -> Result<(), ConsensusError> {
        let qualified_root = QualifiedRoot::of(&block);
        let hash = block.hash();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_decided(&qualified_root, &hash) {
            return Ok(());
        }
        if let Some(election) = state.roots.get_mut(&qualified_root) {
            election.insert_block(block);
            return Ok(());
        }
        if state.roots.len() >= self.max_elections {
            return Err(ConsensusError::ElectionCapacityReached(self.max_elections));
        }
        state
            .roots
            .insert(qualified_root, Election::new(block, Timestamp::now()));
        Ok(())
    }

    /// Whether an election is tracking this block.
    pub fn active(&self, block: &Block) -> bool {
        let qualified_root = QualifiedRoot::of(block);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .roots
            .get(&qualified_root)
            .map(|election| election.contains(&block.hash()))
            .unwrap_or(false)
    }

    /// Drop the election covering this block's position.
    pub fn erase(&self, block: &Block) -> Option<Vec<BlockHash>> {
        let qualified_root = QualifiedRoot::of(block);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roots.remove(&qualified_root).map(|election| {
            election.blocks().map(|block| block.hash()).collect()
        })
    }

    /// The consensus layer observed quorum for `hash`: mark the winner,
    /// remember the decision, and hand it to the confirmation-height
    /// processor.
    pub fn confirm(&self, block: &Block) -> bool {
        let qualified_root = QualifiedRoot::of(block);
        let hash = block.hash();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(election) = state.roots.get_mut(&qualified_root) else {
            return false;
        };
        if !election.confirm(&hash) {
            return false;
        }
        state.roots.remove(&qualified_root);
        state.remember_decision(qualified_root, hash);
        let confirmed = self.confirmed.lock().unwrap_or_else(|e| e.into_inner());
        if confirmed.send(hash).is_err() {
            tracing::warn!(%hash, "confirmation channel closed, winner dropped");
        }
        true
    }

    pub fn recently_confirmed(&self, hash: &BlockHash) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.decided_hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
