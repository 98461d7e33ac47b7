//! Online weight samples — periodic records of the voting weight observed
//! online, used to compute the trended quorum base.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use weave_types::Amount;

use crate::StoreError;

#[derive(Clone, Copy)]
pub struct OnlineWeightStore {
    table: Database<Bytes, Bytes>,
}

impl OnlineWeightStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    /// Record a sample keyed by its Unix timestamp (big-endian for ordered
    /// iteration).
    pub fn put(&self, txn: &mut RwTxn, timestamp: u64, amount: &Amount) -> Result<(), StoreError> {
        self.table
            .put(txn, &timestamp.to_be_bytes(), &amount.to_be_bytes())?;
        Ok(())
    }

    pub fn del(&self, txn: &mut RwTxn, timestamp: u64) -> Result<(), StoreError> {
        self.table.delete(txn, &timestamp.to_be_bytes())?;
        Ok(())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.table.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.table.clear(txn)?;
        Ok(())
    }

    /// All samples in timestamp order.
    pub fn iter(&self, txn: &RoTxn) -> Result<Vec<(u64, Amount)>, StoreError> {
        let mut samples = Vec::new();
        for entry in self.table.iter(txn)? {
            let (key, value) = entry?;
            let key: [u8; 8] = key.try_into().map_err(|_| {
                StoreError::Serialization("online weight key must be 8 bytes".into())
            })?;
            let value: [u8; 16] = value.try_into().map_err(|_| {
                StoreError::Serialization("online weight value must be 16 bytes".into())
            })?;
            samples.push((u64::from_be_bytes(key), Amount::from_be_bytes(value)));
        }
        Ok(samples)
    }
}
