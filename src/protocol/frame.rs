//! Frame struct and the frame codec.
//!
//! A [`Frame`] is the in-memory view of one protocol message. Its payload is
//! always the decompressed JSON; compression only exists on the wire.
//!
//! # Example
//!
//! ```
//! use neboloop_comms::protocol::{decode_frame, encode_frame, ConversationId, Frame, FrameType};
//!
//! let frame = Frame::new(FrameType::Presence, ConversationId::nil(), 0, &b"{\"status\":\"online\"}"[..]);
//! let bytes = encode_frame(&frame).unwrap();
//! let decoded = decode_frame(&bytes).unwrap();
//!
//! assert_eq!(decoded.frame_type, FrameType::Presence);
//! assert_eq!(decoded.payload(), frame.payload());
//! ```

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::ids::{ConversationId, MessageId};
use super::wire_format::{
    flags, FrameType, Header, COMPRESSION_THRESHOLD, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};
use crate::codec::compression;
use crate::error::{CommsError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version.
    pub version: u8,
    /// Frame type.
    pub frame_type: FrameType,
    /// Flags. `COMPRESSED` is always clear on a decoded frame.
    pub flags: u8,
    /// Conversation scope (nil when not scoped).
    pub conversation_id: ConversationId,
    /// Sequence number.
    pub seq: u64,
    /// Unique per-frame id.
    pub message_id: MessageId,
    /// JSON payload (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with a freshly generated message id.
    pub fn new(
        frame_type: FrameType,
        conversation_id: ConversationId,
        seq: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame_type,
            flags: 0,
            conversation_id,
            seq,
            message_id: MessageId::generate(),
            payload: payload.into(),
        }
    }

    /// Set additional flag bits.
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this frame is marked ephemeral.
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        flags::has_flag(self.flags, flags::EPHEMERAL)
    }

    /// Check if this frame is marked encrypted.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        flags::has_flag(self.flags, flags::ENCRYPTED)
    }
}

/// Encode a frame to its wire form.
///
/// The payload cap is checked on the raw payload before compression is
/// considered; an oversized payload is rejected, never truncated.
///
/// # Errors
///
/// Returns `CommsError::PayloadTooLarge` for payloads over 32768 bytes and
/// `CommsError::Compression` if the compressor fails.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    if frame.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CommsError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut frame_flags = frame.flags;
    let compressed = if flags::has_flag(frame_flags, flags::COMPRESSED) {
        None
    } else {
        compression::maybe_compress(&frame.payload, COMPRESSION_THRESHOLD)?
    };
    if compressed.is_some() {
        frame_flags |= flags::COMPRESSED;
    }
    let body: &[u8] = compressed.as_deref().unwrap_or(&frame.payload[..]);

    let header = Header {
        version: frame.version,
        frame_type: frame.frame_type,
        flags: frame_flags,
        payload_length: body.len() as u32,
        message_id: frame.message_id,
        conversation_id: frame.conversation_id,
        seq: frame.seq,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Decode one frame from a complete message buffer.
///
/// Bytes after the declared payload are ignored.
///
/// # Errors
///
/// Short header, unsupported version, oversized or truncated payload, and
/// decompression failures are all returned as errors.
pub fn decode_frame(buf: &[u8]) -> Result<Frame> {
    let header = Header::decode(buf).ok_or_else(|| {
        CommsError::Protocol(format!(
            "short header: {} bytes, need {}",
            buf.len(),
            HEADER_SIZE
        ))
    })?;
    header.validate()?;

    let len = header.payload_length as usize;
    let available = buf.len() - HEADER_SIZE;
    if available < len {
        return Err(CommsError::Protocol(format!(
            "truncated payload: header declares {len} bytes, got {available}"
        )));
    }

    finish_frame(header, &buf[HEADER_SIZE..HEADER_SIZE + len])
}

/// Read and decode one frame from a byte stream.
///
/// # Errors
///
/// Same as [`decode_frame`], plus `CommsError::Io` when the stream ends or
/// fails mid-frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head).await?;

    // HEADER_SIZE bytes are present, decode cannot fail
    let header = Header::decode(&head)
        .ok_or_else(|| CommsError::Protocol("short header".to_string()))?;
    header.validate()?;

    let mut payload = vec![0u8; header.payload_length as usize];
    reader.read_exact(&mut payload).await?;

    finish_frame(header, &payload)
}

/// Decompress if needed and build the in-memory frame.
fn finish_frame(header: Header, body: &[u8]) -> Result<Frame> {
    let (payload, frame_flags) = if header.is_compressed() {
        let plain = compression::decompress(body, MAX_PAYLOAD_SIZE)?;
        (Bytes::from(plain), header.flags & !flags::COMPRESSED)
    } else {
        (Bytes::copy_from_slice(body), header.flags)
    };

    Ok(Frame {
        version: header.version,
        frame_type: header.frame_type,
        flags: frame_flags,
        conversation_id: header.conversation_id,
        seq: header.seq,
        message_id: header.message_id,
        payload,
    })
}
