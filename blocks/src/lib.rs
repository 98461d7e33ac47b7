//! Block variants for the weave block-lattice.
//!
//! Block types:
//! - **Send**: decrease the account balance, creating a pending entry for the
//!   destination
//! - **Receive**: consume a pending entry addressed to this account
//! - **Open**: first block of a chain, consuming the first pending entry
//! - **Change**: reassign voting weight delegation
//! - **State**: universal block carrying the full account state; the subtype
//!   (send/receive/open/change/epoch) is inferred from balance and link
//!
//! Every block carries an Ed25519 signature over its hash and a
//! proof-of-work nonce over its root (`previous` if set, else the account).

pub mod change;
pub mod error;
pub mod open;
pub mod receive;
pub mod send;
pub mod sideband;
pub mod state;

pub use change::ChangeBlock;
pub use error::BlockError;
pub use open::OpenBlock;
pub use receive::ReceiveBlock;
pub use send::SendBlock;
pub use sideband::BlockSideband;
pub use state::StateBlock;

use serde::{Deserialize, Serialize};
use weave_types::{Account, Amount, BlockHash, Link, PublicKey, Root, Signature};

/// Wire type tag of a block (one byte in bulk streams and publish payloads).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    Invalid = 0,
    /// Stream terminator — not an actual block.
    NotABlock = 1,
    Send = 2,
    Receive = 3,
    Open = 4,
    Change = 5,
    State = 6,
}

impl BlockType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::NotABlock),
            2 => Some(Self::Send),
            3 => Some(Self::Receive),
            4 => Some(Self::Open),
            5 => Some(Self::Change),
            6 => Some(Self::State),
            _ => None,
        }
    }

    /// Size of the serialized body (including signature and work) for this
    /// type, or `None` for non-block tags.
    pub fn body_size(&self) -> Option<usize> {
        match self {
            Self::Send => Some(SendBlock::SERIALIZED_SIZE),
            Self::Receive => Some(ReceiveBlock::SERIALIZED_SIZE),
            Self::Open => Some(OpenBlock::SERIALIZED_SIZE),
            Self::Change => Some(ChangeBlock::SERIALIZED_SIZE),
            Self::State => Some(StateBlock::SERIALIZED_SIZE),
            Self::Invalid | Self::NotABlock => None,
        }
    }
}

/// A block in the lattice — one state transition on an account's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Send(_) => BlockType::Send,
            Self::Receive(_) => BlockType::Receive,
            Self::Open(_) => BlockType::Open,
            Self::Change(_) => BlockType::Change,
            Self::State(_) => BlockType::State,
        }
    }

    /// The content hash of this block (Blake2b-256 over canonical fields).
    pub fn hash(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.hash(),
            Self::Receive(b) => b.hash(),
            Self::Open(b) => b.hash(),
            Self::Change(b) => b.hash(),
            Self::State(b) => b.hash(),
        }
    }

    /// The hash of the predecessor block, zero for chain-opening blocks.
    pub fn previous(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Open(_) => BlockHash::ZERO,
            Self::Change(b) => b.previous,
            Self::State(b) => b.previous,
        }
    }

    /// The proof-of-work root: `previous` if set, otherwise the account.
    pub fn root(&self) -> Root {
        match self {
            Self::Open(b) => Root::from(b.account),
            Self::State(b) if b.previous.is_zero() => Root::from(b.account),
            other => Root::from(other.previous()),
        }
    }

    /// The account field, for block types that carry one.
    pub fn account_field(&self) -> Option<Account> {
        match self {
            Self::Open(b) => Some(b.account),
            Self::State(b) => Some(b.account),
            _ => None,
        }
    }

    /// The source block hash consumed by receive-style blocks.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Self::Receive(b) => Some(b.source),
            Self::Open(b) => Some(b.source),
            _ => None,
        }
    }

    /// The destination account of a legacy send.
    pub fn destination(&self) -> Option<Account> {
        match self {
            Self::Send(b) => Some(b.destination),
            _ => None,
        }
    }

    /// The state-block link field.
    pub fn link(&self) -> Option<Link> {
        match self {
            Self::State(b) => Some(b.link),
            _ => None,
        }
    }

    /// The representative named by this block, if any.
    pub fn representative(&self) -> Option<Account> {
        match self {
            Self::Open(b) => Some(b.representative),
            Self::Change(b) => Some(b.representative),
            Self::State(b) => Some(b.representative),
            _ => None,
        }
    }

    /// The balance carried in the block body (send and state blocks only;
    /// other types derive their balance from context).
    pub fn balance_field(&self) -> Option<Amount> {
        match self {
            Self::Send(b) => Some(b.balance),
            Self::State(b) => Some(b.balance),
            _ => None,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Self::Send(b) => b.work,
            Self::Receive(b) => b.work,
            Self::Open(b) => b.work,
            Self::Change(b) => b.work,
            Self::State(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: u64) {
        match self {
            Self::Send(b) => b.work = work,
            Self::Receive(b) => b.work = work,
            Self::Open(b) => b.work = work,
            Self::Change(b) => b.work = work,
            Self::State(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Self::Send(b) => &b.signature,
            Self::Receive(b) => &b.signature,
            Self::Open(b) => &b.signature,
            Self::Change(b) => &b.signature,
            Self::State(b) => &b.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        match self {
            Self::Send(b) => b.signature = signature,
            Self::Receive(b) => b.signature = signature,
            Self::Open(b) => b.signature = signature,
            Self::Change(b) => b.signature = signature,
            Self::State(b) => b.signature = signature,
        }
    }

    /// Verify this block's signature against the given public key.
    pub fn verify_signature(&self, key: &PublicKey) -> bool {
        weave_crypto::verify_signature(self.hash().as_bytes(), self.signature(), key)
    }

    /// Verify this block's proof-of-work against a threshold.
    pub fn verify_work(&self, threshold: u64) -> bool {
        weave_work::validate_work(&self.root(), self.work(), threshold)
    }

    /// Serialize the block body (without the leading type byte).
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        match self {
            Self::Send(b) => b.serialize(buffer),
            Self::Receive(b) => b.serialize(buffer),
            Self::Open(b) => b.serialize(buffer),
            Self::Change(b) => b.serialize(buffer),
            Self::State(b) => b.serialize(buffer),
        }
    }

    /// Serialize with the one-byte type prefix used in bulk streams.
    pub fn serialize_with_type(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.block_type().as_u8());
        self.serialize(buffer);
    }

    /// Deserialize a block body of a known type.
    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Result<Self, BlockError> {
        match block_type {
            BlockType::Send => SendBlock::deserialize(bytes).map(Self::Send),
            BlockType::Receive => ReceiveBlock::deserialize(bytes).map(Self::Receive),
            BlockType::Open => OpenBlock::deserialize(bytes).map(Self::Open),
            BlockType::Change => ChangeBlock::deserialize(bytes).map(Self::Change),
            BlockType::State => StateBlock::deserialize(bytes).map(Self::State),
            BlockType::NotABlock => Err(BlockError::NotABlock),
            BlockType::Invalid => Err(BlockError::UnknownType(0)),
        }
    }

    /// Deserialize from a type-prefixed buffer. Returns the block and the
    /// number of bytes consumed.
    pub fn deserialize_with_type(bytes: &[u8]) -> Result<(Self, usize), BlockError> {
        let type_byte = *bytes.first().ok_or(BlockError::Truncated {
            expected: 1,
            actual: 0,
        })?;
        let block_type =
            BlockType::from_u8(type_byte).ok_or(BlockError::UnknownType(type_byte))?;
        let body_size = block_type.body_size().ok_or(BlockError::NotABlock)?;
        if bytes.len() < 1 + body_size {
            return Err(BlockError::Truncated {
                expected: 1 + body_size,
                actual: bytes.len(),
            });
        }
        let block = Self::deserialize(block_type, &bytes[1..1 + body_size])?;
        Ok((block, 1 + body_size))
    }
}

// ── Field codec helpers shared by the block bodies ──────────────────────

pub(crate) fn read_32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}

pub(crate) fn read_16(bytes: &[u8], offset: usize) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes[offset..offset + 16]);
    out
}

pub(crate) fn read_signature(bytes: &[u8], offset: usize) -> Signature {
    let mut out = [0u8; 64];
    out.copy_from_slice(&bytes[offset..offset + 64]);
    Signature::new(out)
}

pub(crate) fn check_len(bytes: &[u8], expected: usize) -> Result<(), BlockError> {
    if bytes.len() < expected {
        return Err(BlockError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}
