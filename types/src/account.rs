//! Account identity — a 256-bit Ed25519 public key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WeaveError;

/// An account in the block-lattice, identified by its 32-byte public key.
///
/// Each account owns exactly one chain of blocks; the key doubles as the
/// proof-of-work root of the chain's first block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Encode as the human-readable address form (`wve_` + hex).
    pub fn encode(&self) -> String {
        format!("wve_{}", hex::encode(self.0))
    }

    /// Decode an address produced by [`Account::encode`]. Bare hex without
    /// the `wve_` prefix is also accepted.
    pub fn decode(input: &str) -> Result<Self, WeaveError> {
        let hex_part = input.strip_prefix("wve_").unwrap_or(input);
        let bytes = hex::decode(hex_part)
            .map_err(|_| WeaveError::InvalidAccount(input.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WeaveError::InvalidAccount(input.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({}…)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let account = Account::new([0x5A; 32]);
        let encoded = account.encode();
        assert!(encoded.starts_with("wve_"));
        assert_eq!(Account::decode(&encoded).unwrap(), account);
    }

    #[test]
    fn decode_accepts_bare_hex() {
        let account = Account::new([0x17; 32]);
        let bare = hex::encode(account.as_bytes());
        assert_eq!(Account::decode(&bare).unwrap(), account);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Account::decode("wve_abcd").is_err());
        assert!(Account::decode("not hex at all").is_err());
    }

    #[test]
    fn ordering_is_byte_order() {
        let low = Account::new([0x01; 32]);
        let high = Account::new([0x02; 32]);
        assert!(low < high);
    }
}
