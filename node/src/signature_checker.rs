//! Batched signature verification on a rayon worker pool.
//!
//! Only state blocks go through the batch path — their signer is knowable
//! without a store lookup (the account field, or the epoch signer for
//! epoch-link blocks). Legacy blocks resolve their signer from the previous
//! block inside the ledger.

use rayon::prelude::*;

use weave_blocks::Block;
use weave_crypto::verify_signature;
use weave_types::{Account, Link, PublicKey};

pub struct SignatureChecker {
    epoch_link: Link,
    epoch_signer: Account,
}

impl SignatureChecker {
    pub fn new(epoch_link: Link, epoch_signer: Account) -> Self {
        Self {
            epoch_link,
            epoch_signer,
        }
    }

    /// Verify one state block's signature without store access.
    pub fn verify_one(&self, block: &Block) -> bool {
        let Block::State(state) = block else {
            // Legacy signers need ledger context; let the ledger decide.
            return true;
        };
        let hash = state.hash();
        if verify_signature(hash.as_bytes(), &state.signature, &PublicKey::from(state.account)) {
            return true;
        }
        state.link == self.epoch_link
            && verify_signature(
                hash.as_bytes(),
                &state.signature,
                &PublicKey::from(self.epoch_signer),
            )
    }

    /// Verify a batch in parallel. Returns one flag per input block.
    pub fn verify_batch(&self, blocks: &[Block]) -> Vec<bool> {
        blocks.par_iter().map(|block| self.verify_one(block)).collect()
    }
}
