//! Length-prefixed framing
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON. A header announcing more than [`MAX_FRAME_SIZE`] bytes leaves
//! the stream unrecoverable, so the reader reports it as fatal. A body that
//! fails to decode is still well delimited and can be skipped.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use hyperpub_core::{ProtocolError, TransportError, WireMessage};

/// Maximum frame body size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length of the frame header
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Frame a text payload
pub fn encode_frame(payload: &str) -> Result<Bytes, ProtocolError> {
    let body = payload.as_bytes();
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut framed = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body.len());
    framed.put_u32(body.len() as u32);
    framed.extend_from_slice(body);
    Ok(framed.freeze())
}

/// Serialize and frame a wire message
pub fn encode_message(message: &WireMessage) -> Result<Bytes, ProtocolError> {
    encode_frame(&message.to_json()?)
}

/// Parse one frame from the front of a buffer
///
/// Returns the body text and the number of bytes consumed.
pub fn decode_frame(data: &[u8]) -> Result<(String, usize), ProtocolError> {
    if data.len() < LENGTH_PREFIX_LEN {
        return Err(ProtocolError::InsufficientData {
            needed: LENGTH_PREFIX_LEN,
            available: data.len(),
        });
    }

    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let end = LENGTH_PREFIX_LEN + len;
    if data.len() < end {
        return Err(ProtocolError::InsufficientData {
            needed: end,
            available: data.len(),
        });
    }

    let text = std::str::from_utf8(&data[LENGTH_PREFIX_LEN..end])
        .map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((text.to_string(), end))
}

/// Read one frame body from a stream
///
/// Returns `Ok(None)` on a clean close at a frame boundary. An oversize
/// header or a stream that ends mid-frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_LEN {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(ProtocolError::InsufficientData {
                    needed: LENGTH_PREFIX_LEN,
                    available: filled,
                }
                .into());
            }
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(Bytes::from(body)))
}

/// Write one framed payload and flush
pub async fn write_frame<W>(writer: &mut W, payload: &str) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a frame body as UTF-8 text
pub fn frame_text(body: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)
}
