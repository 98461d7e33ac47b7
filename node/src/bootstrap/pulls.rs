//! Pull bookkeeping for bootstrap attempts.

use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::VecDeque;

use weave_types::{Account, BlockHash};

/// Base retry allowance for a pull; grows with the number of blocks the
/// pull has already delivered.
pub const PULL_RETRY_LIMIT: u32 = 16;

/// Lazy pulls are cheaper to retry and the walk depends on them, so they
/// get double the allowance.
pub const LAZY_RETRY_LIMIT: u32 = PULL_RETRY_LIMIT * 2;

/// One chain download: from `head` walking back to `end` (exclusive of
/// blocks we already have).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullInfo {
    /// Account being pulled; zero for lazy hash pulls.
    pub account: Account,
    /// Start of the walk: the remote head (or a lazy hash).
    pub head: BlockHash,
    /// Known ancestor to stop at; zero pulls the whole chain.
    pub end: BlockHash,
    /// Cap on blocks per request; zero = unlimited.
    pub count: u32,
    /// Times this pull has been dispatched.
    pub attempts: u32,
    /// Blocks received across all attempts.
    pub processed: u64,
    /// Whether the retry allowance uses the lazy limit.
    pub lazy: bool,
}

impl PullInfo {
    pub fn new(account: Account, head: BlockHash, end: BlockHash) -> Self {
        Self {
            account,
            head,
            end,
            count: 0,
            attempts: 0,
            processed: 0,
            lazy: false,
        }
    }

    pub fn lazy(hash: BlockHash, count: u32) -> Self {
        Self {
            account: Account::ZERO,
            head: hash,
            end: BlockHash::ZERO,
            count,
            attempts: 0,
            processed: 0,
            lazy: true,
        }
    }

    /// Retry allowance: pulls that already delivered blocks earn patience.
    pub fn retry_limit(&self) -> u32 {
        let base = if self.lazy {
            LAZY_RETRY_LIMIT
        } else {
            PULL_RETRY_LIMIT
        };
        base + (self.processed / 10_000) as u32
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.retry_limit()
    }
}

/// FIFO of pending pulls with shuffle-on-start and retry accounting.
pub struct PullQueue {
    pulls: VecDeque<PullInfo>,
    /// Pulls abandoned after exhausting their retries.
    abandoned: Vec<PullInfo>,
}

impl PullQueue {
    pub fn new() -> Self {
        Self {
            pulls: VecDeque::new(),
            abandoned: Vec::new(),
        }
    }

    pub fn push(&mut self, pull: PullInfo) {
        self.pulls.push_back(pull);
    }

    pub fn pop(&mut self) -> Option<PullInfo> {
        self.pulls.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulls.is_empty()
    }

    /// Randomize dispatch order so all clients do not hammer the same
    /// account ranges.
    pub fn shuffle(&mut self) {
        let mut pulls: Vec<PullInfo> = self.pulls.drain(..).collect();
        pulls.shuffle(&mut thread_rng());
        self.pulls = pulls.into();
    }

    /// Requeue a failed pull; once the retry allowance is exhausted the
    /// pull is cached as abandoned instead. Returns `true` if requeued.
    pub fn requeue(&mut self, mut pull: PullInfo) -> bool {
        pull.attempts += 1;
        if pull.exhausted() {
            tracing::debug!(
                account = %pull.account,
                head = %pull.head,
                attempts = pull.attempts,
                "abandoning pull"
            );
            self.abandoned.push(pull);
            return false;
        }
        self.pulls.push_back(pull);
        true
    }

    pub fn abandoned(&self) -> &[PullInfo] {
        &self.abandoned
    }
}

impl Default for PullQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull() -> PullInfo {
        PullInfo::new(
            Account::new([1u8; 32]),
            BlockHash::new([2u8; 32]),
            BlockHash::ZERO,
        )
    }

    #[test]
    fn retry_limit_grows_with_processed() {
        let mut info = pull();
        assert_eq!(info.retry_limit(), 16);
        info.processed = 50_000;
        assert_eq!(info.retry_limit(), 21);
    }

    #[test]
    fn lazy_pulls_retry_more() {
        let info = PullInfo::lazy(BlockHash::new([3u8; 32]), 512);
        assert_eq!(info.retry_limit(), 32);
    }

    #[test]
    fn requeue_until_exhausted() {
        let mut queue = PullQueue::new();
        let mut info = pull();
        info.attempts = 15;
        assert!(queue.requeue(info));
        let info = queue.pop().unwrap();
        assert_eq!(info.attempts, 16);
        assert!(!queue.requeue(info));
        assert!(queue.is_empty());
        assert_eq!(queue.abandoned().len(), 1);
    }

    #[test]
    fn shuffle_preserves_contents() {
        let mut queue = PullQueue::new();
        for byte in 0..16u8 {
            queue.push(PullInfo::new(
                Account::new([byte; 32]),
                BlockHash::new([byte; 32]),
                BlockHash::ZERO,
            ));
        }
        queue.shuffle();
        assert_eq!(queue.len(), 16);
    }
}
