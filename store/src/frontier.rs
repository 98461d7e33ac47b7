//! Frontier storage — the reverse index from a chain head to its account.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use weave_types::{Account, BlockHash};

use crate::StoreError;

#[derive(Clone, Copy)]
pub struct FrontierStore {
    table: Database<Bytes, Bytes>,
}

impl FrontierStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    pub fn put(
        &self,
        txn: &mut RwTxn,
        hash: &BlockHash,
        account: &Account,
    ) -> Result<(), StoreError> {
        self.table.put(txn, hash.as_bytes(), account.as_bytes())?;
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        match self.table.get(txn, hash.as_bytes())? {
            Some(bytes) => {
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    StoreError::Serialization("frontier value must be 32 bytes".into())
                })?;
                Ok(Some(Account::new(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn del(&self, txn: &mut RwTxn, hash: &BlockHash) -> Result<(), StoreError> {
        self.table.delete(txn, hash.as_bytes())?;
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
