//! Async framing over TCP streams: header first, then the payload length
//! the header implies.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use weave_messages::{Message, MessageHeader, HEADER_SIZE, PROTOCOL_VERSION_MIN};
use weave_types::NetworkId;

use crate::NetworkError;

/// Upper bound on any single payload; a header implying more than this is a
/// protocol violation.
const MAX_PAYLOAD: usize = 1024 * 1024;

/// Read one framed message, validating network and protocol version.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    network: NetworkId,
) -> Result<(MessageHeader, Message), NetworkError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = MessageHeader::deserialize(&header_bytes)?;
    if header.network != network {
        return Err(weave_messages::MessageError::WrongNetwork.into());
    }
    if header.version_using < PROTOCOL_VERSION_MIN {
        return Err(weave_messages::MessageError::VersionTooOld(header.version_using).into());
    }
    let payload_size = Message::payload_size(&header)?;
    if payload_size > MAX_PAYLOAD {
        return Err(weave_messages::MessageError::OversizedPayload(payload_size).into());
    }
    let mut payload = vec![0u8; payload_size];
    reader.read_exact(&mut payload).await?;
    let message = Message::deserialize_payload(&header, &payload)?;
    Ok((header, message))
}

/// Write one framed message.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
    network: NetworkId,
) -> Result<(), NetworkError> {
    let bytes = message.serialize(network);
    writer.write_all(&bytes).await?;
    Ok(())
}
