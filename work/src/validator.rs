//! PoW validation.

use weave_crypto::blake2b_256;
use weave_types::Root;

/// Compute the work value for a (root, nonce) pair.
///
/// Concatenates root + nonce LE bytes, hashes with Blake2b-256, and
/// interprets the first 8 bytes as a little-endian u64.
pub fn work_value(root: &Root, nonce: u64) -> u64 {
    let mut input = [0u8; 40];
    input[0..32].copy_from_slice(root.as_bytes());
    input[32..40].copy_from_slice(&nonce.to_le_bytes());

    let hash = blake2b_256(&input);
    u64::from_le_bytes([
        hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
    ])
}

/// Validate that a work nonce meets the minimum difficulty for a given root.
pub fn validate_work(root: &Root, nonce: u64, min_difficulty: u64) -> bool {
    work_value(root, nonce) >= min_difficulty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkGenerator;

    #[test]
    fn generated_nonce_passes_validation() {
        let generator = WorkGenerator;
        let root = Root::new([0xDE; 32]);
        let min_difficulty = 5000;

        let nonce = generator.generate(&root, min_difficulty).unwrap();
        assert!(validate_work(&root, nonce.0, min_difficulty));
    }

    #[test]
    fn zero_nonce_with_zero_difficulty() {
        let root = Root::new([0u8; 32]);
        assert!(validate_work(&root, 0, 0));
    }

    #[test]
    fn invalid_nonce_fails() {
        let root = Root::new([0xFF; 32]);
        assert!(!validate_work(&root, 12345, u64::MAX));
    }

    #[test]
    fn validation_is_exact_at_threshold() {
        let root = Root::new([0x42; 32]);
        let nonce = 98765;
        let value = work_value(&root, nonce);

        assert!(validate_work(&root, nonce, value));
        assert!(!validate_work(&root, nonce, value + 1));
    }

    #[test]
    fn different_roots_produce_different_work() {
        let value1 = work_value(&Root::new([0x11; 32]), 7);
        let value2 = work_value(&Root::new([0x22; 32]), 7);
        assert_ne!(value1, value2);
    }
}
