//! Legacy change block: reassign voting weight delegation.

use serde::{Deserialize, Serialize};
use weave_crypto::{blake2b_256_multi, sign_message};
use weave_types::{Account, BlockHash, PrivateKey, Signature};

use crate::{check_len, read_32, read_signature, BlockError};

/// A legacy representative change block. Moves the account's full balance of
/// voting weight to a new representative without transferring value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: u64,
}

impl ChangeBlock {
    /// previous(32) + representative(32) + signature(64) + work(8)
    pub const SERIALIZED_SIZE: usize = 32 + 32 + 64 + 8;

    pub fn new(
        previous: BlockHash,
        representative: Account,
        private_key: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            previous,
            representative,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_message(block.hash().as_bytes(), private_key);
        block
    }

    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            self.previous.as_bytes(),
            self.representative.as_bytes(),
        ]))
    }

    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.previous.as_bytes());
        buffer.extend_from_slice(self.representative.as_bytes());
        buffer.extend_from_slice(self.signature.as_bytes());
        buffer.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        check_len(bytes, Self::SERIALIZED_SIZE)?;
        let mut work_bytes = [0u8; 8];
        work_bytes.copy_from_slice(&bytes[128..136]);
        Ok(Self {
            previous: BlockHash::new(read_32(bytes, 0)),
            representative: Account::new(read_32(bytes, 32)),
            signature: read_signature(bytes, 64),
            work: u64::from_le_bytes(work_bytes),
        })
    }
}
