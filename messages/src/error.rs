use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("header truncated: {0} bytes")]
    HeaderTruncated(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("message from wrong network")]
    WrongNetwork,

    #[error("peer protocol version {0} below minimum")]
    VersionTooOld(u8),

    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("payload truncated: expected {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid block type in header extensions")]
    InvalidBlockType,

    #[error("payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error(transparent)]
    Block(#[from] weave_blocks::BlockError),
}
