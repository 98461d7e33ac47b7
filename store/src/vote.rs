//! Vote storage — the highest-sequence vote seen per representative,
//! persisted for replay protection across restarts.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_types::{Account, BlockHash, Signature};

use crate::StoreError;

/// The last vote observed from a representative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVote {
    pub voter: Account,
    pub sequence: u64,
    pub hashes: Vec<BlockHash>,
    pub signature: Signature,
}

#[derive(Clone, Copy)]
pub struct VoteStore {
    table: Database<Bytes, Bytes>,
}

impl VoteStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    pub fn put(&self, txn: &mut RwTxn, vote: &StoredVote) -> Result<(), StoreError> {
        let bytes = bincode::serialize(vote)?;
        self.table.put(txn, vote.voter.as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, voter: &Account) -> Result<Option<StoredVote>, StoreError> {
        match self.table.get(txn, voter.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.table.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.table.clear(txn)?;
        Ok(())
    }
}
