//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which weave network a node is connected to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public beta network.
    Beta,
    /// Local development / test network.
    Dev,
}

impl NetworkId {
    /// Default peering port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 7075,
            Self::Beta => 54000,
            Self::Dev => 44000,
        }
    }

    /// The network byte carried in every message header.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Live => b'L',
            Self::Beta => b'B',
            Self::Dev => b'D',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'L' => Some(Self::Live),
            b'B' => Some(Self::Beta),
            b'D' => Some(Self::Dev),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Beta => "beta",
            Self::Dev => "dev",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_per_network() {
        assert_eq!(NetworkId::Live.default_port(), 7075);
        assert_eq!(NetworkId::Beta.default_port(), 54000);
        assert_eq!(NetworkId::Dev.default_port(), 44000);
    }

    #[test]
    fn byte_roundtrip() {
        for network in [NetworkId::Live, NetworkId::Beta, NetworkId::Dev] {
            assert_eq!(NetworkId::from_byte(network.as_byte()), Some(network));
        }
        assert_eq!(NetworkId::from_byte(0), None);
    }
}
