//! Wallet-lazy bootstrap — seeded with a set of accounts whose pending
//! entries are fetched via `bulk_pull_account`; every unknown send hash
//! feeds the lazy walk.

use std::collections::{HashSet, VecDeque};

use weave_types::Account;

pub struct WalletLazy {
    queue: VecDeque<Account>,
    seen: HashSet<Account>,
}

impl WalletLazy {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn seed(&mut self, account: Account) -> bool {
        if account.is_zero() || !self.seen.insert(account) {
            return false;
        }
        self.queue.push_back(account);
        true
    }

    pub fn seed_many(&mut self, accounts: impl IntoIterator<Item = Account>) {
        for account in accounts {
            self.seed(account);
        }
    }

    pub fn next(&mut self) -> Option<Account> {
        self.queue.pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for WalletLazy {
    fn default() -> Self {
        Self::new()
    }
}
