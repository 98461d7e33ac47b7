use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("unknown block type byte {0}")]
    UnknownType(u8),

    #[error("block body truncated: expected {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("stream terminated")]
    NotABlock,
}
