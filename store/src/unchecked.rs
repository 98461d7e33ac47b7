//! Unchecked storage — blocks held back because a dependency is missing.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_blocks::Block;
use weave_types::{BlockHash, Timestamp};

use crate::StoreError;

/// Cached result of signature verification, carried across the unchecked
/// round-trip so a flushed block is not re-verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureVerification {
    Unknown,
    Invalid,
    Valid,
}

/// Key of an unchecked entry: the missing dependency and the waiting
/// block's own hash. The binary form groups entries by dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UncheckedKey {
    pub dependency: BlockHash,
    pub hash: BlockHash,
}

impl UncheckedKey {
    pub fn new(dependency: BlockHash, hash: BlockHash) -> Self {
        Self { dependency, hash }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.dependency.as_bytes());
        bytes[32..].copy_from_slice(self.hash.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != 64 {
            return Err(StoreError::Serialization(
                "unchecked key must be 64 bytes".into(),
            ));
        }
        let mut dependency = [0u8; 32];
        let mut hash = [0u8; 32];
        dependency.copy_from_slice(&bytes[..32]);
        hash.copy_from_slice(&bytes[32..]);
        Ok(Self {
            dependency: BlockHash::new(dependency),
            hash: BlockHash::new(hash),
        })
    }
}

/// A block waiting for its dependency to arrive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncheckedInfo {
    pub block: Block,
    /// When the entry was stored; used by the garbage collector.
    pub modified: Timestamp,
    pub verified: SignatureVerification,
}

#[derive(Clone, Copy)]
pub struct UncheckedStore {
    table: Database<Bytes, Bytes>,
}

impl UncheckedStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    pub fn put(
        &self,
        txn: &mut RwTxn,
        key: &UncheckedKey,
        info: &UncheckedInfo,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info)?;
        self.table.put(txn, &key.to_bytes(), &bytes)?;
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, key: &UncheckedKey) -> Result<Option<UncheckedInfo>, StoreError> {
        match self.table.get(txn, &key.to_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn del(&self, txn: &mut RwTxn, key: &UncheckedKey) -> Result<(), StoreError> {
        self.table.delete(txn, &key.to_bytes())?;
        Ok(())
    }

    pub fn exists(&self, txn: &RoTxn, key: &UncheckedKey) -> Result<bool, StoreError> {
        Ok(self.table.get(txn, &key.to_bytes())?.is_some())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.table.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.table.clear(txn)?;
        Ok(())
    }

    /// All entries waiting on `dependency`.
    pub fn get_dependents(
        &self,
        txn: &RoTxn,
        dependency: &BlockHash,
    ) -> Result<Vec<(UncheckedKey, UncheckedInfo)>, StoreError> {
        let start = UncheckedKey::new(*dependency, BlockHash::ZERO).to_bytes();
        let mut dependents = Vec::new();
        let bound = (
            std::ops::Bound::Included(&start[..]),
            std::ops::Bound::Unbounded,
        );
        for entry in self.table.range(txn, &bound)? {
            let (key_bytes, value) = entry?;
            let key = UncheckedKey::from_bytes(key_bytes)?;
            if key.dependency != *dependency {
                break;
            }
            dependents.push((key, bincode::deserialize(value)?));
        }
        Ok(dependents)
    }

    /// Full scan in key order.
    pub fn iter<'t>(
        &self,
        txn: &'t RoTxn,
    ) -> Result<impl Iterator<Item = Result<(UncheckedKey, UncheckedInfo), StoreError>> + 't, StoreError>
    {
        Ok(self.table.iter(txn)?.map(|entry| {
            let (key, value) = entry?;
            Ok((UncheckedKey::from_bytes(key)?, bincode::deserialize(value)?))
        }))
    }
}
