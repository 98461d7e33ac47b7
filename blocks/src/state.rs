//! State block — the universal block format.
//!
//! Carries the full account state. The operation subtype is inferred at
//! ledger time from the balance delta and the link semantics:
//! `balance < previous_balance` is a send, `link == 0` a representative
//! change, an epoch link with unchanged balance an epoch upgrade, and
//! anything else a receive.

use serde::{Deserialize, Serialize};
use weave_crypto::{blake2b_256_multi, sign_message};
use weave_types::{Account, Amount, BlockHash, Link, PrivateKey, Signature};

use crate::{check_len, read_16, read_32, read_signature, BlockError};

/// Preamble mixed into every state-block hash so state hashes can never
/// collide with legacy block hashes: 32 bytes, all zero except the final
/// byte, which is the state type tag.
const STATE_HASH_PREAMBLE: [u8; 32] = {
    let mut preamble = [0u8; 32];
    preamble[31] = 6;
    preamble
};

/// A state block in the weave block-lattice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    pub link: Link,
    pub signature: Signature,
    pub work: u64,
}

impl StateBlock {
    /// account(32) + previous(32) + representative(32) + balance(16) +
    /// link(32) + signature(64) + work(8)
    pub const SERIALIZED_SIZE: usize = 32 + 32 + 32 + 16 + 32 + 64 + 8;

    pub fn new(
        account: Account,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        link: Link,
        private_key: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_message(block.hash().as_bytes(), private_key);
        block
    }

    /// Blake2b-256 over the preamble and canonical fields.
    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            &STATE_HASH_PREAMBLE,
            self.account.as_bytes(),
            self.previous.as_bytes(),
            self.representative.as_bytes(),
            &self.balance.to_be_bytes(),
            self.link.as_bytes(),
        ]))
    }

    /// Whether this is the first block of its account chain.
    pub fn is_open(&self) -> bool {
        self.previous.is_zero()
    }

    /// State-block work is serialized big-endian on the wire, unlike the
    /// legacy types.
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.account.as_bytes());
        buffer.extend_from_slice(self.previous.as_bytes());
        buffer.extend_from_slice(self.representative.as_bytes());
        buffer.extend_from_slice(&self.balance.to_be_bytes());
        buffer.extend_from_slice(self.link.as_bytes());
        buffer.extend_from_slice(self.signature.as_bytes());
        buffer.extend_from_slice(&self.work.to_be_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        check_len(bytes, Self::SERIALIZED_SIZE)?;
        let mut work_bytes = [0u8; 8];
        work_bytes.copy_from_slice(&bytes[208..216]);
        Ok(Self {
            account: Account::new(read_32(bytes, 0)),
            previous: BlockHash::new(read_32(bytes, 32)),
            representative: Account::new(read_32(bytes, 64)),
            balance: Amount::from_be_bytes(read_16(bytes, 96)),
            link: Link::new(read_32(bytes, 112)),
            signature: read_signature(bytes, 144),
            work: u64::from_be_bytes(work_bytes),
        })
    }
}
