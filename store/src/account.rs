//! Account info storage, split by epoch generation.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_types::{Account, Amount, BlockHash, Epoch, Timestamp};

use crate::iterator::MergedIter;
use crate::StoreError;

/// Per-account state tracked by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Hash of the latest block in this account's chain.
    pub head: BlockHash,
    /// Hash of the first block in this account's chain.
    pub open_block: BlockHash,
    /// Hash of the most recent block that named the representative.
    pub representative_block: BlockHash,
    /// Balance after the head block.
    pub balance: Amount,
    /// Local time of the last modification.
    pub modified: Timestamp,
    /// Number of blocks in this account's chain.
    pub block_count: u64,
    /// Schema generation of this account.
    pub epoch: Epoch,
}

/// Accounts are keyed by their 32-byte public key; the value is the
/// bincode-encoded [`AccountInfo`]. Epoch 0 accounts live in `accounts_v0`,
/// upgraded accounts in `accounts_v1`.
#[derive(Clone, Copy)]
pub struct AccountStore {
    v0: Database<Bytes, Bytes>,
    v1: Database<Bytes, Bytes>,
}

impl AccountStore {
    pub(crate) fn new(v0: Database<Bytes, Bytes>, v1: Database<Bytes, Bytes>) -> Self {
        Self { v0, v1 }
    }

    pub fn put(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        info: &AccountInfo,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info)?;
        match info.epoch {
            Epoch::Epoch0 => {
                self.v1.delete(txn, account.as_bytes())?;
                self.v0.put(txn, account.as_bytes(), &bytes)?;
            }
            Epoch::Epoch1 => {
                self.v0.delete(txn, account.as_bytes())?;
                self.v1.put(txn, account.as_bytes(), &bytes)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, account: &Account) -> Result<Option<AccountInfo>, StoreError> {
        if let Some(bytes) = self.v1.get(txn, account.as_bytes())? {
            return Ok(Some(bincode::deserialize(bytes)?));
        }
        match self.v0.get(txn, account.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn del(&self, txn: &mut RwTxn, account: &Account) -> Result<(), StoreError> {
        let in_v0 = self.v0.delete(txn, account.as_bytes())?;
        let in_v1 = self.v1.delete(txn, account.as_bytes())?;
        if !in_v0 && !in_v1 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn exists(&self, txn: &RoTxn, account: &Account) -> Result<bool, StoreError> {
        Ok(self.get(txn, account)?.is_some())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.v0.len(txn)? + self.v1.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.v0.clear(txn)?;
        self.v1.clear(txn)?;
        Ok(())
    }

    /// Merged, account-ordered iteration over both generations starting at
    /// `start` (inclusive).
    pub fn iter_from<'t>(
        &self,
        txn: &'t RoTxn,
        start: &Account,
    ) -> Result<impl Iterator<Item = Result<(Account, AccountInfo), StoreError>> + 't, StoreError>
    {
        let start_key = *start.as_bytes();
        let bound = (
            std::ops::Bound::Included(&start_key[..]),
            std::ops::Bound::Unbounded,
        );
        let v0 = self.v0.range(txn, &bound)?.map(decode_entry);
        let v1 = self.v1.range(txn, &bound)?.map(decode_entry);
        Ok(MergedIter::new(v0, v1))
    }

    /// Merged iteration over every account.
    pub fn iter<'t>(
        &self,
        txn: &'t RoTxn,
    ) -> Result<impl Iterator<Item = Result<(Account, AccountInfo), StoreError>> + 't, StoreError>
    {
        self.iter_from(txn, &Account::ZERO)
    }
}

fn decode_entry(
    entry: Result<(&[u8], &[u8]), heed::Error>,
) -> Result<(Account, AccountInfo), StoreError> {
    let (key, value) = entry?;
    let key: [u8; 32] = key
        .try_into()
        .map_err(|_| StoreError::Serialization("account key must be 32 bytes".into()))?;
    Ok((Account::new(key), bincode::deserialize(value)?))
}
