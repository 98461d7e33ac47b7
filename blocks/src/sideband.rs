//! Block sideband — metadata stored alongside each block.

use serde::{Deserialize, Serialize};
use weave_types::{Account, Amount, BlockHash, Timestamp};

use crate::BlockType;

/// Metadata computed at insertion time and persisted next to the block body.
///
/// The sideband never changes after the block is written, with one
/// exception: `successor` is patched when the next block of the chain is
/// inserted (and cleared again on rollback).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSideband {
    pub block_type: BlockType,
    /// The account that owns the chain this block belongs to.
    pub account: Account,
    /// Balance of the account after this block.
    pub balance: Amount,
    /// Height in the account chain; the open block has height 1.
    pub height: u64,
    /// Hash of the next block in the chain, zero at the head.
    pub successor: BlockHash,
    /// Local time when the block was inserted.
    pub timestamp: Timestamp,
}

impl BlockSideband {
    pub fn new(
        block_type: BlockType,
        account: Account,
        balance: Amount,
        height: u64,
        successor: BlockHash,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            block_type,
            account,
            balance,
            height,
            successor,
            timestamp,
        }
    }
}
