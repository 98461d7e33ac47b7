//! Account epochs — per-account schema versions.
//!
//! An epoch upgrade is a special state block signed by the epoch signer that
//! raises an account's epoch without moving value. Pending entries remember
//! the epoch of the sending account so receives can be forced onto the new
//! schema.

use serde::{Deserialize, Serialize};

/// Schema version of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Epoch {
    /// Legacy accounts; send/receive/open/change block types allowed.
    Epoch0,
    /// State-block-only accounts.
    Epoch1,
}

impl Epoch {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Epoch0 => 0,
            Self::Epoch1 => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Epoch0),
            1 => Some(Self::Epoch1),
            _ => None,
        }
    }

    /// The epoch that follows this one, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Epoch0 => Some(Self::Epoch1),
            Self::Epoch1 => None,
        }
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::Epoch0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ordering() {
        assert!(Epoch::Epoch0 < Epoch::Epoch1);
    }

    #[test]
    fn u8_roundtrip() {
        for epoch in [Epoch::Epoch0, Epoch::Epoch1] {
            assert_eq!(Epoch::from_u8(epoch.as_u8()), Some(epoch));
        }
        assert_eq!(Epoch::from_u8(7), None);
    }

    #[test]
    fn successor_chain() {
        assert_eq!(Epoch::Epoch0.successor(), Some(Epoch::Epoch1));
        assert_eq!(Epoch::Epoch1.successor(), None);
    }
}
