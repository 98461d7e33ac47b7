//! In-memory representative weight cache.
//!
//! Weight of a representative = sum of balances of the accounts currently
//! delegating to it. Maintained incrementally on every apply and rollback;
//! rebuilt from the account table when the ledger opens.

use std::collections::HashMap;
use std::sync::Mutex;

use weave_types::{Account, Amount};

pub struct RepWeights {
    weights: Mutex<HashMap<Account, u128>>,
}

impl RepWeights {
    pub fn new() -> Self {
        Self {
            weights: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a signed delta to a representative's weight.
    pub fn adjust(&self, representative: &Account, add: Amount, subtract: Amount) {
        let mut weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        let entry = weights.entry(*representative).or_insert(0);
        *entry = entry
            .saturating_add(add.raw())
            .saturating_sub(subtract.raw());
        if *entry == 0 {
            weights.remove(representative);
        }
    }

    pub fn add(&self, representative: &Account, amount: Amount) {
        self.adjust(representative, amount, Amount::ZERO);
    }

    pub fn subtract(&self, representative: &Account, amount: Amount) {
        self.adjust(representative, Amount::ZERO, amount);
    }

    pub fn get(&self, representative: &Account) -> Amount {
        let weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        Amount::new(weights.get(representative).copied().unwrap_or(0))
    }

    pub fn snapshot(&self) -> HashMap<Account, Amount> {
        let weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        weights
            .iter()
            .map(|(account, weight)| (*account, Amount::new(*weight)))
            .collect()
    }
}

impl Default for RepWeights {
    fn default() -> Self {
        Self::new()
    }
}
