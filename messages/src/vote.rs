//! Votes carried by confirm_ack messages.

use serde::{Deserialize, Serialize};
use weave_crypto::blake2b_256_multi;
use weave_types::{Account, BlockHash, PrivateKey, PublicKey, Signature};

/// Domain separator mixed into every vote digest.
const VOTE_PREFIX: &[u8] = b"vote ";

/// A representative's vote over one or more block hashes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    /// Monotonic per-representative sequence number for replay protection.
    pub sequence: u64,
    pub hashes: Vec<BlockHash>,
}

impl Vote {
    pub fn new(
        account: Account,
        private_key: &PrivateKey,
        sequence: u64,
        hashes: Vec<BlockHash>,
    ) -> Self {
        let mut vote = Self {
            account,
            signature: Signature::ZERO,
            sequence,
            hashes,
        };
        vote.signature = weave_crypto::sign_message(vote.digest().as_bytes(), private_key);
        vote
    }

    /// The digest representatives sign: prefix, each hash, sequence LE.
    pub fn digest(&self) -> BlockHash {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(self.hashes.len() + 2);
        parts.push(VOTE_PREFIX);
        for hash in &self.hashes {
            parts.push(hash.as_bytes());
        }
        let sequence_bytes = self.sequence.to_le_bytes();
        parts.push(&sequence_bytes);
        BlockHash::new(blake2b_256_multi(&parts))
    }

    pub fn validate(&self) -> bool {
        weave_crypto::verify_signature(
            self.digest().as_bytes(),
            &self.signature,
            &PublicKey::from(self.account),
        )
    }
}
