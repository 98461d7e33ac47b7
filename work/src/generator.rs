//! PoW generation (CPU).
//!
//! A single-threaded reference implementation. Production deployments invoke
//! external kernels through the same `generate(root, difficulty) -> nonce`
//! contract; the node core only ever validates.

use crate::validator::work_value;
use crate::{WorkError, WorkNonce};
use weave_types::Root;

/// Generates proof-of-work for a block root.
pub struct WorkGenerator;

impl WorkGenerator {
    /// Generate a work nonce that meets the minimum difficulty.
    ///
    /// Iterates nonces until `hash(root || nonce)` meets the threshold.
    pub fn generate(&self, root: &Root, min_difficulty: u64) -> Result<WorkNonce, WorkError> {
        for nonce in 0u64.. {
            if work_value(root, nonce) >= min_difficulty {
                return Ok(WorkNonce(nonce));
            }
        }
        Err(WorkError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_work;

    #[test]
    fn generate_meets_difficulty() {
        let generator = WorkGenerator;
        let root = Root::new([0x42; 32]);
        let min_difficulty = 1000;

        let nonce = generator.generate(&root, min_difficulty).unwrap();
        assert!(validate_work(&root, nonce.0, min_difficulty));
    }

    #[test]
    fn zero_difficulty_returns_first_nonce() {
        let generator = WorkGenerator;
        let root = Root::new([0u8; 32]);
        let nonce = generator.generate(&root, 0).unwrap();
        assert_eq!(nonce.0, 0);
    }
}
