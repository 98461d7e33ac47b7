//! Pending (unreceived send) storage, split by source epoch generation.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_types::{Account, Amount, BlockHash, Epoch};

use crate::iterator::MergedIter;
use crate::StoreError;

/// Key of a pending entry: the destination account and the hash of the send
/// block that created it. The binary form orders entries by destination,
/// which lets per-account scans use a range query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingKey {
    pub destination: Account,
    pub send_hash: BlockHash,
}

impl PendingKey {
    pub fn new(destination: Account, send_hash: BlockHash) -> Self {
        Self {
            destination,
            send_hash,
        }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.destination.as_bytes());
        bytes[32..].copy_from_slice(self.send_hash.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != 64 {
            return Err(StoreError::Serialization(
                "pending key must be 64 bytes".into(),
            ));
        }
        let mut destination = [0u8; 32];
        let mut send_hash = [0u8; 32];
        destination.copy_from_slice(&bytes[..32]);
        send_hash.copy_from_slice(&bytes[32..]);
        Ok(Self {
            destination: Account::new(destination),
            send_hash: BlockHash::new(send_hash),
        })
    }
}

/// An unconsumed send addressed to some destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// The account that sent the funds.
    pub source: Account,
    pub amount: Amount,
    /// Epoch of the sending account at send time; a receive of an epoch-1
    /// pending entry must itself be a state block.
    pub epoch: Epoch,
}

#[derive(Clone, Copy)]
pub struct PendingStore {
    v0: Database<Bytes, Bytes>,
    v1: Database<Bytes, Bytes>,
}

impl PendingStore {
    pub(crate) fn new(v0: Database<Bytes, Bytes>, v1: Database<Bytes, Bytes>) -> Self {
        Self { v0, v1 }
    }

    pub fn put(
        &self,
        txn: &mut RwTxn,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info)?;
        match info.epoch {
            Epoch::Epoch0 => self.v0.put(txn, &key.to_bytes(), &bytes)?,
            Epoch::Epoch1 => self.v1.put(txn, &key.to_bytes(), &bytes)?,
        }
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError> {
        if let Some(bytes) = self.v1.get(txn, &key.to_bytes())? {
            return Ok(Some(bincode::deserialize(bytes)?));
        }
        match self.v0.get(txn, &key.to_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn del(&self, txn: &mut RwTxn, key: &PendingKey) -> Result<(), StoreError> {
        let in_v1 = self.v1.delete(txn, &key.to_bytes())?;
        let in_v0 = self.v0.delete(txn, &key.to_bytes())?;
        if !in_v0 && !in_v1 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn exists(&self, txn: &RoTxn, key: &PendingKey) -> Result<bool, StoreError> {
        Ok(self.get(txn, key)?.is_some())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.v0.len(txn)? + self.v1.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.v0.clear(txn)?;
        self.v1.clear(txn)?;
        Ok(())
    }

    /// Sum of all pending amounts (total in-flight value).
    pub fn total_amount(&self, txn: &RoTxn) -> Result<Amount, StoreError> {
        let mut total = Amount::ZERO;
        for entry in self.iter(txn)? {
            let (_, info) = entry?;
            total = total
                .checked_add(info.amount)
                .ok_or_else(|| StoreError::Serialization("pending total overflow".into()))?;
        }
        Ok(total)
    }

    /// Merged, key-ordered iteration over both generations from `start`.
    pub fn iter_from<'t>(
        &self,
        txn: &'t RoTxn,
        start: &PendingKey,
    ) -> Result<impl Iterator<Item = Result<(PendingKey, PendingInfo), StoreError>> + 't, StoreError>
    {
        let start_key = start.to_bytes();
        let bound = (
            std::ops::Bound::Included(&start_key[..]),
            std::ops::Bound::Unbounded,
        );
        let v0 = self.v0.range(txn, &bound)?.map(decode_entry);
        let v1 = self.v1.range(txn, &bound)?.map(decode_entry);
        Ok(MergedIter::new(v0, v1))
    }

    pub fn iter<'t>(
        &self,
        txn: &'t RoTxn,
    ) -> Result<impl Iterator<Item = Result<(PendingKey, PendingInfo), StoreError>> + 't, StoreError>
    {
        self.iter_from(txn, &PendingKey::new(Account::ZERO, BlockHash::ZERO))
    }

    /// All pending entries addressed to `destination`, in send-hash order.
    pub fn iter_account<'t>(
        &self,
        txn: &'t RoTxn,
        destination: Account,
    ) -> Result<impl Iterator<Item = Result<(PendingKey, PendingInfo), StoreError>> + 't, StoreError>
    {
        let start = PendingKey::new(destination, BlockHash::ZERO);
        Ok(self.iter_from(txn, &start)?.take_while(move |entry| {
            entry
                .as_ref()
                .map(|(key, _)| key.destination == destination)
                .unwrap_or(true)
        }))
    }
}

fn decode_entry(
    entry: Result<(&[u8], &[u8]), heed::Error>,
) -> Result<(PendingKey, PendingInfo), StoreError> {
    let (key, value) = entry?;
    Ok((PendingKey::from_bytes(key)?, bincode::deserialize(value)?))
}
