//! Legacy open block: the first block of an account's chain.

use serde::{Deserialize, Serialize};
use weave_crypto::{blake2b_256_multi, sign_message};
use weave_types::{Account, BlockHash, PrivateKey, Signature};

use crate::{check_len, read_32, read_signature, BlockError};

/// A legacy open block. Consumes the first pending entry (`source`) and
/// names the account's initial representative. Its work root is the account
/// key since there is no previous block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: u64,
}

impl OpenBlock {
    /// source(32) + representative(32) + account(32) + signature(64) + work(8)
    pub const SERIALIZED_SIZE: usize = 32 + 32 + 32 + 64 + 8;

    pub fn new(
        source: BlockHash,
        representative: Account,
        account: Account,
        private_key: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            source,
            representative,
            account,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_message(block.hash().as_bytes(), private_key);
        block
    }

    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            self.source.as_bytes(),
            self.representative.as_bytes(),
            self.account.as_bytes(),
        ]))
    }

    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.source.as_bytes());
        buffer.extend_from_slice(self.representative.as_bytes());
        buffer.extend_from_slice(self.account.as_bytes());
        buffer.extend_from_slice(self.signature.as_bytes());
        buffer.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        check_len(bytes, Self::SERIALIZED_SIZE)?;
        let mut work_bytes = [0u8; 8];
        work_bytes.copy_from_slice(&bytes[160..168]);
        Ok(Self {
            source: BlockHash::new(read_32(bytes, 0)),
            representative: Account::new(read_32(bytes, 32)),
            account: Account::new(read_32(bytes, 64)),
            signature: read_signature(bytes, 96),
            work: u64::from_le_bytes(work_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_crypto::keypair_from_seed;

    #[test]
    fn serialization_roundtrip() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let block = OpenBlock::new(
            BlockHash::new([0x55; 32]),
            Account::new([0x66; 32]),
            Account::new(*kp.public.as_bytes()),
            &kp.private,
            11,
        );
        let mut buffer = Vec::new();
        block.serialize(&mut buffer);
        assert_eq!(buffer.len(), OpenBlock::SERIALIZED_SIZE);
        assert_eq!(OpenBlock::deserialize(&buffer).unwrap(), block);
    }
}
