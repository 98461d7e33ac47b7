use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Message(#[from] weave_messages::MessageError),

    #[error("peer endpoint is in a reserved address range")]
    ReservedEndpoint,

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("channel not found")]
    ChannelNotFound,

    #[error("too many connections")]
    TooManyConnections,
}
