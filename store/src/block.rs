//! Block storage — one table per block type, bodies stored next to their
//! sidebands.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use weave_blocks::{Block, BlockSideband, BlockType};
use weave_types::{Account, Amount, BlockHash, Epoch};

use crate::StoreError;

/// A block body with its sideband, as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub block: Block,
    pub sideband: BlockSideband,
}

/// Blocks are keyed by hash. Legacy types each have their own table; state
/// blocks are split by the epoch of the owning account.
#[derive(Clone, Copy)]
pub struct BlockStore {
    send: Database<Bytes, Bytes>,
    receive: Database<Bytes, Bytes>,
    open: Database<Bytes, Bytes>,
    change: Database<Bytes, Bytes>,
    state_v0: Database<Bytes, Bytes>,
    state_v1: Database<Bytes, Bytes>,
}

impl BlockStore {
    pub(crate) fn new(
        send: Database<Bytes, Bytes>,
        receive: Database<Bytes, Bytes>,
        open: Database<Bytes, Bytes>,
        change: Database<Bytes, Bytes>,
        state_v0: Database<Bytes, Bytes>,
        state_v1: Database<Bytes, Bytes>,
    ) -> Self {
        Self {
            send,
            receive,
            open,
            change,
            state_v0,
            state_v1,
        }
    }

    fn table_for(&self, block_type: BlockType, epoch: Epoch) -> Option<Database<Bytes, Bytes>> {
        match block_type {
            BlockType::Send => Some(self.send),
            BlockType::Receive => Some(self.receive),
            BlockType::Open => Some(self.open),
            BlockType::Change => Some(self.change),
            BlockType::State => Some(match epoch {
                Epoch::Epoch0 => self.state_v0,
                Epoch::Epoch1 => self.state_v1,
            }),
            BlockType::Invalid | BlockType::NotABlock => None,
        }
    }

    /// Tables in block-lookup probe order.
    fn all_tables(&self) -> [Database<Bytes, Bytes>; 6] {
        [
            self.state_v1,
            self.state_v0,
            self.send,
            self.receive,
            self.open,
            self.change,
        ]
    }

    /// Insert a block with its freshly computed sideband. `epoch` selects the
    /// state-block generation; it is ignored for legacy types.
    pub fn put(
        &self,
        txn: &mut RwTxn,
        hash: &BlockHash,
        block: &Block,
        sideband: &BlockSideband,
        epoch: Epoch,
    ) -> Result<(), StoreError> {
        let table = self
            .table_for(block.block_type(), epoch)
            .ok_or(StoreError::NotFound)?;
        let record = StoredBlock {
            block: block.clone(),
            sideband: sideband.clone(),
        };
        let bytes = bincode::serialize(&record)?;
        table.put(txn, hash.as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn get(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<StoredBlock>, StoreError> {
        for table in self.all_tables() {
            if let Some(bytes) = table.get(txn, hash.as_bytes())? {
                return Ok(Some(bincode::deserialize(bytes)?));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, txn: &RoTxn, hash: &BlockHash) -> Result<bool, StoreError> {
        for table in self.all_tables() {
            if table.get(txn, hash.as_bytes())?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn del(&self, txn: &mut RwTxn, hash: &BlockHash) -> Result<(), StoreError> {
        for table in self.all_tables() {
            if table.delete(txn, hash.as_bytes())? {
                return Ok(());
            }
        }
        Err(StoreError::NotFound)
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        let mut total = 0;
        for table in self.all_tables() {
            total += table.len(txn)?;
        }
        Ok(total)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        for table in self.all_tables() {
            table.clear(txn)?;
        }
        Ok(())
    }

    /// The hash of the block following `hash` in its chain, if any.
    pub fn successor(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<BlockHash>, StoreError> {
        Ok(self.get(txn, hash)?.and_then(|stored| {
            if stored.sideband.successor.is_zero() {
                None
            } else {
                Some(stored.sideband.successor)
            }
        }))
    }

    /// Patch the sideband of `hash` to record `successor` as the next block
    /// of the chain. Pass `BlockHash::ZERO` to clear (rollback path).
    pub fn put_successor(
        &self,
        txn: &mut RwTxn,
        hash: &BlockHash,
        successor: &BlockHash,
    ) -> Result<(), StoreError> {
        for table in self.all_tables() {
            if let Some(bytes) = table.get(txn, hash.as_bytes())? {
                let mut record: StoredBlock = bincode::deserialize(bytes)?;
                record.sideband.successor = *successor;
                let bytes = bincode::serialize(&record)?;
                table.put(txn, hash.as_bytes(), &bytes)?;
                return Ok(());
            }
        }
        Err(StoreError::NotFound)
    }

    /// The account that owns the chain containing `hash` (from the sideband).
    pub fn account(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        Ok(self.get(txn, hash)?.map(|stored| stored.sideband.account))
    }

    /// The balance after `hash` (from the sideband).
    pub fn balance(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Amount>, StoreError> {
        Ok(self.get(txn, hash)?.map(|stored| stored.sideband.balance))
    }

    /// The chain height of `hash` (from the sideband).
    pub fn height(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<u64>, StoreError> {
        Ok(self.get(txn, hash)?.map(|stored| stored.sideband.height))
    }

    /// The epoch generation the block was stored under: the account's epoch
    /// at insertion time for state blocks, `Epoch0` for legacy types.
    pub fn block_epoch(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Epoch>, StoreError> {
        if self.state_v1.get(txn, hash.as_bytes())?.is_some() {
            return Ok(Some(Epoch::Epoch1));
        }
        for table in [self.state_v0, self.send, self.receive, self.open, self.change] {
            if table.get(txn, hash.as_bytes())?.is_some() {
                return Ok(Some(Epoch::Epoch0));
            }
        }
        Ok(None)
    }
}
