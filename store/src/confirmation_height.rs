//! Confirmation height storage — the cemented prefix of each account chain.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_types::{Account, BlockHash};

use crate::StoreError;

/// Cemented state of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationHeightInfo {
    /// Number of cemented blocks; blocks at height <= this are immutable.
    pub height: u64,
    /// Hash of the highest cemented block.
    pub frontier: BlockHash,
}

impl Default for ConfirmationHeightInfo {
    fn default() -> Self {
        Self {
            height: 0,
            frontier: BlockHash::ZERO,
        }
    }
}

#[derive(Clone, Copy)]
pub struct ConfirmationHeightStore {
    table: Database<Bytes, Bytes>,
}

impl ConfirmationHeightStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    pub fn put(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info)?;
        self.table.put(txn, account.as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn get(
        &self,
        txn: &RoTxn,
        account: &Account,
    ) -> Result<Option<ConfirmationHeightInfo>, StoreError> {
        match self.table.get(txn, account.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn del(&self, txn: &mut RwTxn, account: &Account) -> Result<(), StoreError> {
        self.table.delete(txn, account.as_bytes())?;
        Ok(())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.table.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.table.clear(txn)?;
        Ok(())
    }
}
