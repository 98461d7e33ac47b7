//! Legacy send block: transfer value to a destination account.

use serde::{Deserialize, Serialize};
use weave_crypto::{blake2b_256_multi, sign_message};
use weave_types::{Account, Amount, BlockHash, PrivateKey, Signature};

use crate::{check_len, read_16, read_32, read_signature, BlockError};

/// A legacy send block.
///
/// `balance` is the account balance *after* the send; the amount sent is the
/// difference from the previous block's balance, and becomes a pending entry
/// keyed by `(destination, hash)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
}

impl SendBlock {
    /// previous(32) + destination(32) + balance(16) + signature(64) + work(8)
    pub const SERIALIZED_SIZE: usize = 32 + 32 + 16 + 64 + 8;

    pub fn new(
        previous: BlockHash,
        destination: Account,
        balance: Amount,
        private_key: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            previous,
            destination,
            balance,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_message(block.hash().as_bytes(), private_key);
        block
    }

    /// Blake2b-256 over the canonical fields (previous, destination, balance).
    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            self.previous.as_bytes(),
            self.destination.as_bytes(),
            &self.balance.to_be_bytes(),
        ]))
    }

    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.previous.as_bytes());
        buffer.extend_from_slice(self.destination.as_bytes());
        buffer.extend_from_slice(&self.balance.to_be_bytes());
        buffer.extend_from_slice(self.signature.as_bytes());
        buffer.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        check_len(bytes, Self::SERIALIZED_SIZE)?;
        let mut work_bytes = [0u8; 8];
        work_bytes.copy_from_slice(&bytes[144..152]);
        Ok(Self {
            previous: BlockHash::new(read_32(bytes, 0)),
            destination: Account::new(read_32(bytes, 32)),
            balance: Amount::from_be_bytes(read_16(bytes, 64)),
            signature: read_signature(bytes, 80),
            work: u64::from_le_bytes(work_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_crypto::keypair_from_seed;

    fn sample() -> SendBlock {
        let kp = keypair_from_seed(&[1u8; 32]);
        SendBlock::new(
            BlockHash::new([0x11; 32]),
            Account::new([0x22; 32]),
            Amount::new(500),
            &kp.private,
            99,
        )
    }

    #[test]
    fn serialization_roundtrip() {
        let block = sample();
        let mut buffer = Vec::new();
        block.serialize(&mut buffer);
        assert_eq!(buffer.len(), SendBlock::SERIALIZED_SIZE);

        let decoded = SendBlock::deserialize(&buffer).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn hash_excludes_signature_and_work() {
        let mut a = sample();
        let b = sample();
        a.work = 12345;
        a.signature = Signature::new([0xEE; 64]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_covers_balance() {
        let a = sample();
        let mut b = sample();
        b.balance = Amount::new(501);
        assert_ne!(a.hash(), b.hash());
    }
}
