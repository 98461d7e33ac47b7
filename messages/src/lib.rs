//! Wire messages exchanged between weave nodes.
//!
//! Every frame is an 8-byte [`MessageHeader`] followed by a fixed-size
//! payload whose length is computable from the header alone, which is what
//! lets the TCP reader frame the stream without a length prefix. Bulk
//! streams (`bulk_pull`, `bulk_push`) continue past the request message
//! with type-prefixed blocks terminated by `not_a_block`.

pub mod error;
pub mod header;
pub mod vote;

pub use error::MessageError;
pub use header::{
    MessageHeader, MessageType, BULK_PULL_COUNT_PRESENT_FLAG, HANDSHAKE_QUERY_FLAG,
    HANDSHAKE_RESPONSE_FLAG, HEADER_SIZE, MAGIC, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN,
};
pub use vote::Vote;

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use weave_blocks::{Block, BlockType};
use weave_types::{Account, Amount, BlockHash, NetworkId, Root, Signature};

/// Number of peer slots in a keepalive.
pub const KEEPALIVE_PEERS: usize = 8;

const ENDPOINT_SIZE: usize = 18;
const VOTE_FIXED_SIZE: usize = 32 + 64 + 8;

/// How the server should render pending entries in a bulk_pull_account
/// response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BulkPullAccountFlags {
    /// `(send_hash, amount)` pairs.
    PendingHashAndAmount = 0,
    /// `(source_account)` only.
    PendingAddressOnly = 1,
    /// `(send_hash, amount, source_account)` triples.
    PendingHashAmountAndAddress = 2,
}

impl BulkPullAccountFlags {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PendingHashAndAmount),
            1 => Some(Self::PendingAddressOnly),
            2 => Some(Self::PendingHashAmountAndAddress),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [SocketAddr; KEEPALIVE_PEERS],
}

impl Keepalive {
    /// A keepalive with every slot set to the unspecified endpoint.
    pub fn empty() -> Self {
        let unspecified = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);
        Self {
            peers: [unspecified; KEEPALIVE_PEERS],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    pub block: Block,
}

/// Request for votes: either a whole block or `(hash, root)` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmReq {
    Block(Block),
    RootsHashes(Vec<(BlockHash, Root)>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmAck {
    pub vote: Vote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkPull {
    /// A block hash to start from, or an account whose head to start from.
    pub start: [u8; 32],
    /// Walk predecessors down to (and including) this hash; zero = genesis.
    pub end: BlockHash,
    /// Optional cap on the number of blocks streamed; zero = unlimited.
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkPullAccount {
    pub account: Account,
    pub minimum_amount: Amount,
    pub flags: BulkPullAccountFlags,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontierReq {
    pub start: Account,
    /// Only accounts modified within `age` seconds are returned.
    pub age: u32,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdHandshake {
    /// Cookie the peer should sign.
    pub query: Option<[u8; 32]>,
    /// Our node id and signature over the peer's cookie.
    pub response: Option<(Account, Signature)>,
}

/// A decoded wire message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
    BulkPull(BulkPull),
    BulkPush,
    FrontierReq(FrontierReq),
    NodeIdHandshake(NodeIdHandshake),
    BulkPullAccount(BulkPullAccount),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Keepalive(_) => MessageType::Keepalive,
            Self::Publish(_) => MessageType::Publish,
            Self::ConfirmReq(_) => MessageType::ConfirmReq,
            Self::ConfirmAck(_) => MessageType::ConfirmAck,
            Self::BulkPull(_) => MessageType::BulkPull,
            Self::BulkPush => MessageType::BulkPush,
            Self::FrontierReq(_) => MessageType::FrontierReq,
            Self::NodeIdHandshake(_) => MessageType::NodeIdHandshake,
            Self::BulkPullAccount(_) => MessageType::BulkPullAccount,
        }
    }

    fn header(&self, network: NetworkId) -> MessageHeader {
        let mut header = MessageHeader::new(network, self.message_type());
        match self {
            Self::Publish(publish) => header.set_block_type(publish.block.block_type()),
            Self::ConfirmReq(ConfirmReq::Block(block)) => {
                header.set_block_type(block.block_type())
            }
            Self::ConfirmReq(ConfirmReq::RootsHashes(pairs)) => {
                header.set_block_type(BlockType::NotABlock);
                header.set_count(pairs.len().min(15) as u8);
            }
            Self::ConfirmAck(ack) => {
                header.set_block_type(BlockType::NotABlock);
                header.set_count(ack.vote.hashes.len().min(15) as u8);
            }
            Self::BulkPull(pull) => {
                if pull.count != 0 {
                    header.set_flag(BULK_PULL_COUNT_PRESENT_FLAG);
                }
            }
            Self::NodeIdHandshake(handshake) => {
                if handshake.query.is_some() {
                    header.set_flag(HANDSHAKE_QUERY_FLAG);
                }
                if handshake.response.is_some() {
                    header.set_flag(HANDSHAKE_RESPONSE_FLAG);
                }
            }
            _ => {}
        }
        header
    }

    /// Serialize header + payload into one frame.
    pub fn serialize(&self, network: NetworkId) -> Vec<u8> {
        let header = self.header(network);
        let mut buffer = Vec::with_capacity(HEADER_SIZE + 256);
        header.serialize(&mut buffer);
        match self {
            Self::Keepalive(keepalive) => {
                for peer in &keepalive.peers {
                    serialize_endpoint(&mut buffer, peer);
                }
            }
            Self::Publish(publish) => publish.block.serialize(&mut buffer),
            Self::ConfirmReq(ConfirmReq::Block(block)) => block.serialize(&mut buffer),
            Self::ConfirmReq(ConfirmReq::RootsHashes(pairs)) => {
                for (hash, root) in pairs.iter().take(15) {
                    buffer.extend_from_slice(hash.as_bytes());
                    buffer.extend_from_slice(root.as_bytes());
                }
            }
            Self::ConfirmAck(ack) => {
                buffer.extend_from_slice(ack.vote.account.as_bytes());
                buffer.extend_from_slice(ack.vote.signature.as_bytes());
                buffer.extend_from_slice(&ack.vote.sequence.to_le_bytes());
                for hash in ack.vote.hashes.iter().take(15) {
                    buffer.extend_from_slice(hash.as_bytes());
                }
            }
            Self::BulkPull(pull) => {
                buffer.extend_from_slice(&pull.start);
                buffer.extend_from_slice(pull.end.as_bytes());
                if pull.count != 0 {
                    buffer.extend_from_slice(&pull.count.to_le_bytes());
                    buffer.extend_from_slice(&[0u8; 4]);
                }
            }
            Self::BulkPush => {}
            Self::FrontierReq(req) => {
                buffer.extend_from_slice(req.start.as_bytes());
                buffer.extend_from_slice(&req.age.to_le_bytes());
                buffer.extend_from_slice(&req.count.to_le_bytes());
            }
            Self::NodeIdHandshake(handshake) => {
                if let Some(cookie) = &handshake.query {
                    buffer.extend_from_slice(cookie);
                }
                if let Some((account, signature)) = &handshake.response {
                    buffer.extend_from_slice(account.as_bytes());
                    buffer.extend_from_slice(signature.as_bytes());
                }
            }
            Self::BulkPullAccount(req) => {
                buffer.extend_from_slice(req.account.as_bytes());
                buffer.extend_from_slice(&req.minimum_amount.to_be_bytes());
                buffer.push(req.flags as u8);
            }
        }
        buffer
    }

    /// Payload size implied by a header; lets the stream reader know how
    /// many bytes to await before decoding.
    pub fn payload_size(header: &MessageHeader) -> Result<usize, MessageError> {
        Ok(match header.message_type {
            MessageType::Keepalive => KEEPALIVE_PEERS * ENDPOINT_SIZE,
            MessageType::Publish => block_body_size(header)?,
            MessageType::ConfirmReq => match header.block_type() {
                Some(BlockType::NotABlock) => header.count() as usize * 64,
                _ => block_body_size(header)?,
            },
            MessageType::ConfirmAck => VOTE_FIXED_SIZE + header.count() as usize * 32,
            MessageType::BulkPull => {
                64 + if header.flag(BULK_PULL_COUNT_PRESENT_FLAG) {
                    8
                } else {
                    0
                }
            }
            MessageType::BulkPush => 0,
            MessageType::FrontierReq => 40,
            MessageType::NodeIdHandshake => {
                let mut size = 0;
                if header.flag(HANDSHAKE_QUERY_FLAG) {
                    size += 32;
                }
                if header.flag(HANDSHAKE_RESPONSE_FLAG) {
                    size += 96;
                }
                size
            }
            MessageType::BulkPullAccount => 49,
            MessageType::Invalid | MessageType::NotAType => {
                return Err(MessageError::UnknownType(header.message_type.as_u8()))
            }
        })
    }

    /// Decode a payload previously sized by [`Message::payload_size`].
    pub fn deserialize_payload(
        header: &MessageHeader,
        payload: &[u8],
    ) -> Result<Self, MessageError> {
        let expected = Self::payload_size(header)?;
        if payload.len() < expected {
            return Err(MessageError::Truncated {
                expected,
                actual: payload.len(),
            });
        }
        Ok(match header.message_type {
            MessageType::Keepalive => {
                let unspecified = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);
                let mut peers = [unspecified; KEEPALIVE_PEERS];
                for (index, peer) in peers.iter_mut().enumerate() {
                    let offset = index * ENDPOINT_SIZE;
                    *peer = deserialize_endpoint(&payload[offset..offset + ENDPOINT_SIZE]);
                }
                Self::Keepalive(Keepalive { peers })
            }
            MessageType::Publish => {
                let block_type = header.block_type().ok_or(MessageError::InvalidBlockType)?;
                Self::Publish(Publish {
                    block: Block::deserialize(block_type, payload)?,
                })
            }
            MessageType::ConfirmReq => match header.block_type() {
                Some(BlockType::NotABlock) => {
                    let mut pairs = Vec::with_capacity(header.count() as usize);
                    for index in 0..header.count() as usize {
                        let offset = index * 64;
                        pairs.push((
                            BlockHash::new(read_32(payload, offset)),
                            Root::new(read_32(payload, offset + 32)),
                        ));
                    }
                    Self::ConfirmReq(ConfirmReq::RootsHashes(pairs))
                }
                Some(block_type) => Self::ConfirmReq(ConfirmReq::Block(Block::deserialize(
                    block_type, payload,
                )?)),
                None => return Err(MessageError::InvalidBlockType),
            },
            MessageType::ConfirmAck => {
                let account = Account::new(read_32(payload, 0));
                let mut signature = [0u8; 64];
                signature.copy_from_slice(&payload[32..96]);
                let mut sequence_bytes = [0u8; 8];
                sequence_bytes.copy_from_slice(&payload[96..104]);
                let mut hashes = Vec::with_capacity(header.count() as usize);
                for index in 0..header.count() as usize {
                    hashes.push(BlockHash::new(read_32(payload, VOTE_FIXED_SIZE + index * 32)));
                }
                Self::ConfirmAck(ConfirmAck {
                    vote: Vote {
                        account,
                        signature: Signature::new(signature),
                        sequence: u64::from_le_bytes(sequence_bytes),
                        hashes,
                    },
                })
            }
            MessageType::BulkPull => {
                let count = if header.flag(BULK_PULL_COUNT_PRESENT_FLAG) {
                    u32::from_le_bytes([payload[64], payload[65], payload[66], payload[67]])
                } else {
                    0
                };
                Self::BulkPull(BulkPull {
                    start: read_32(payload, 0),
                    end: BlockHash::new(read_32(payload, 32)),
                    count,
                })
            }
            MessageType::BulkPush => Self::BulkPush,
            MessageType::FrontierReq => Self::FrontierReq(FrontierReq {
                start: Account::new(read_32(payload, 0)),
                age: u32::from_le_bytes([payload[32], payload[33], payload[34], payload[35]]),
                count: u32::from_le_bytes([payload[36], payload[37], payload[38], payload[39]]),
            }),
            MessageType::NodeIdHandshake => {
                let mut offset = 0;
                let query = if header.flag(HANDSHAKE_QUERY_FLAG) {
                    let cookie = read_32(payload, offset);
                    offset += 32;
                    Some(cookie)
                } else {
                    None
                };
                let response = if header.flag(HANDSHAKE_RESPONSE_FLAG) {
                    let account = Account::new(read_32(payload, offset));
                    let mut signature = [0u8; 64];
                    signature.copy_from_slice(&payload[offset + 32..offset + 96]);
                    Some((account, Signature::new(signature)))
                } else {
                    None
                };
                Self::NodeIdHandshake(NodeIdHandshake { query, response })
            }
            MessageType::BulkPullAccount => {
                let mut amount_bytes = [0u8; 16];
                amount_bytes.copy_from_slice(&payload[32..48]);
                Self::BulkPullAccount(BulkPullAccount {
                    account: Account::new(read_32(payload, 0)),
                    minimum_amount: Amount::from_be_bytes(amount_bytes),
                    flags: BulkPullAccountFlags::from_u8(payload[48])
                        .ok_or(MessageError::InvalidBlockType)?,
                })
            }
            MessageType::Invalid | MessageType::NotAType => {
                return Err(MessageError::UnknownType(header.message_type.as_u8()))
            }
        })
    }

    /// Decode a complete frame (header + payload). Returns the message and
    /// total bytes consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<(MessageHeader, Self, usize), MessageError> {
        let header = MessageHeader::deserialize(bytes)?;
        let payload_size = Self::payload_size(&header)?;
        if bytes.len() < HEADER_SIZE + payload_size {
            return Err(MessageError::Truncated {
                expected: HEADER_SIZE + payload_size,
                actual: bytes.len(),
            });
        }
        let message =
            Self::deserialize_payload(&header, &bytes[HEADER_SIZE..HEADER_SIZE + payload_size])?;
        Ok((header, message, HEADER_SIZE + payload_size))
    }
}

/// Serialized body size of the block type named in the header extensions.
fn block_body_size(header: &MessageHeader) -> Result<usize, MessageError> {
    let block_type = header.block_type().ok_or(MessageError::InvalidBlockType)?;
    block_type.body_size().ok_or(MessageError::InvalidBlockType)
}

fn read_32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}

/// 18-byte endpoint: IPv6 (or v4-mapped) octets plus little-endian port.
pub fn serialize_endpoint(buffer: &mut Vec<u8>, endpoint: &SocketAddr) {
    let ip: Ipv6Addr = match endpoint.ip() {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    buffer.extend_from_slice(&ip.octets());
    buffer.extend_from_slice(&endpoint.port().to_le_bytes());
}

pub fn deserialize_endpoint(bytes: &[u8]) -> SocketAddr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes[..16]);
    let port = u16::from_le_bytes([bytes[16], bytes[17]]);
    let ip = Ipv6Addr::from(octets);
    match ip.to_ipv4_mapped() {
        Some(v4) => SocketAddr::new(IpAddr::V4(v4), port),
        None => SocketAddr::new(IpAddr::V6(ip), port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_blocks::StateBlock;
    use weave_crypto::keypair_from_seed;
    use weave_types::Link;

    fn sample_block() -> Block {
        let kp = keypair_from_seed(&[1u8; 32]);
        Block::State(StateBlock::new(
            Account::new(*kp.public.as_bytes()),
            BlockHash::new([0x10; 32]),
            Account::new([0x20; 32]),
            Amount::new(999),
            Link::new([0x30; 32]),
            &kp.private,
            77,
        ))
    }

    fn roundtrip(message: Message) -> Message {
        let bytes = message.serialize(NetworkId::Dev);
        let (_, decoded, consumed) = Message::deserialize(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        decoded
    }

    #[test]
    fn keepalive_roundtrip() {
        let mut keepalive = Keepalive::empty();
        keepalive.peers[0] = "10.0.0.1:7075".parse().unwrap();
        keepalive.peers[3] = "[2001:db8::2]:54000".parse().unwrap();
        let message = Message::Keepalive(keepalive);
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn publish_roundtrip() {
        let message = Message::Publish(Publish {
            block: sample_block(),
        });
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn confirm_req_block_roundtrip() {
        let message = Message::ConfirmReq(ConfirmReq::Block(sample_block()));
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn confirm_req_pairs_roundtrip() {
        let pairs = vec![
            (BlockHash::new([0x01; 32]), Root::new([0x02; 32])),
            (BlockHash::new([0x03; 32]), Root::new([0x04; 32])),
        ];
        let message = Message::ConfirmReq(ConfirmReq::RootsHashes(pairs));
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn confirm_ack_roundtrip() {
        let kp = keypair_from_seed(&[2u8; 32]);
        let vote = Vote::new(
            Account::new(*kp.public.as_bytes()),
            &kp.private,
            9,
            vec![BlockHash::new([0x05; 32]), BlockHash::new([0x06; 32])],
        );
        let message = Message::ConfirmAck(ConfirmAck { vote });
        let decoded = roundtrip(message.clone());
        assert_eq!(decoded, message);
        match decoded {
            Message::ConfirmAck(ack) => assert!(ack.vote.validate()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn bulk_pull_roundtrip_with_and_without_count() {
        let without = Message::BulkPull(BulkPull {
            start: [0x11; 32],
            end: BlockHash::new([0x22; 32]),
            count: 0,
        });
        assert_eq!(roundtrip(without.clone()), without);

        let with = Message::BulkPull(BulkPull {
            start: [0x11; 32],
            end: BlockHash::ZERO,
            count: 512,
        });
        assert_eq!(roundtrip(with.clone()), with);
    }

    #[test]
    fn frontier_req_roundtrip() {
        let message = Message::FrontierReq(FrontierReq {
            start: Account::new([0x07; 32]),
            age: u32::MAX,
            count: u32::MAX,
        });
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn handshake_roundtrip_all_combinations() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let account = Account::new(*kp.public.as_bytes());
        let signature = weave_crypto::sign_message(b"cookie", &kp.private);

        for (query, response) in [
            (Some([0x0C; 32]), None),
            (None, Some((account, signature))),
            (Some([0x0C; 32]), Some((account, signature))),
        ] {
            let message = Message::NodeIdHandshake(NodeIdHandshake { query, response });
            assert_eq!(roundtrip(message.clone()), message);
        }
    }

    #[test]
    fn bulk_pull_account_roundtrip() {
        let message = Message::BulkPullAccount(BulkPullAccount {
            account: Account::new([0x09; 32]),
            minimum_amount: Amount::new(1_000_000),
            flags: BulkPullAccountFlags::PendingHashAmountAndAddress,
        });
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn bulk_push_has_empty_payload() {
        let bytes = Message::BulkPush.serialize(NetworkId::Dev);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(roundtrip(Message::BulkPush), Message::BulkPush);
    }

    #[test]
    fn truncated_frame_rejected() {
        let message = Message::Publish(Publish {
            block: sample_block(),
        });
        let mut bytes = message.serialize(NetworkId::Dev);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            Message::deserialize(&bytes),
            Err(MessageError::Truncated { .. })
        ));
    }
}
