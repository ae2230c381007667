//! Wire format encoding and decoding.
//!
//! Implements the 47-byte header format:
//! ```text
//! ┌─────────┬──────┬───────┬────────────┬────────────┬─────────────────┬──────────┐
//! │ Version │ Type │ Flags │ Payload len│ Message ID │ Conversation ID │ Seq      │
//! │ 1 byte  │1 byte│ 1 byte│ uint32 BE  │ 16 bytes   │ 16 bytes        │ uint64 BE│
//! └─────────┴──────┴───────┴────────────┴────────────┴─────────────────┴──────────┘
//!  offset 0   1      2       3..7         7..23        23..39            39..47
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{CommsError, Result};

use super::ids::{ConversationId, MessageId};

/// Header size in bytes (fixed, exactly 47).
pub const HEADER_SIZE: usize = 47;

/// Maximum uncompressed payload size.
pub const MAX_PAYLOAD_SIZE: usize = 32_768;

/// Payloads larger than this are candidates for compression.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// The only protocol version this client speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Flag constants for the protocol.
pub mod flags {
    /// Payload is compressed on the wire.
    pub const COMPRESSED: u8 = 0b0000_0001;
    /// Payload is end-to-end encrypted (opaque to this client).
    pub const ENCRYPTED: u8 = 0b0000_0010;
    /// Frame must not be persisted by the gateway.
    pub const EPHEMERAL: u8 = 0b0000_0100;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Frame type byte.
///
/// Unknown values survive decoding as [`FrameType::Other`] so the read loop
/// can log and drop them instead of failing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Connect,
    AuthOk,
    AuthFail,
    JoinConversation,
    LeaveConversation,
    SendMessage,
    MessageDelivery,
    Ack,
    Presence,
    Typing,
    SlowDown,
    Replay,
    Close,
    /// A type byte this client does not know.
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => FrameType::Connect,
            0x02 => FrameType::AuthOk,
            0x03 => FrameType::AuthFail,
            0x04 => FrameType::JoinConversation,
            0x05 => FrameType::LeaveConversation,
            0x06 => FrameType::SendMessage,
            0x07 => FrameType::MessageDelivery,
            0x08 => FrameType::Ack,
            0x09 => FrameType::Presence,
            0x0A => FrameType::Typing,
            0x0B => FrameType::SlowDown,
            0x0C => FrameType::Replay,
            0x0D => FrameType::Close,
            other => FrameType::Other(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Connect => 0x01,
            FrameType::AuthOk => 0x02,
            FrameType::AuthFail => 0x03,
            FrameType::JoinConversation => 0x04,
            FrameType::LeaveConversation => 0x05,
            FrameType::SendMessage => 0x06,
            FrameType::MessageDelivery => 0x07,
            FrameType::Ack => 0x08,
            FrameType::Presence => 0x09,
            FrameType::Typing => 0x0A,
            FrameType::SlowDown => 0x0B,
            FrameType::Replay => 0x0C,
            FrameType::Close => 0x0D,
            FrameType::Other(other) => other,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameType::Connect => "CONNECT",
            FrameType::AuthOk => "AUTH_OK",
            FrameType::AuthFail => "AUTH_FAIL",
            FrameType::JoinConversation => "JOIN_CONVERSATION",
            FrameType::LeaveConversation => "LEAVE_CONVERSATION",
            FrameType::SendMessage => "SEND_MESSAGE",
            FrameType::MessageDelivery => "MESSAGE_DELIVERY",
            FrameType::Ack => "ACK",
            FrameType::Presence => "PRESENCE",
            FrameType::Typing => "TYPING",
            FrameType::SlowDown => "SLOW_DOWN",
            FrameType::Replay => "REPLAY",
            FrameType::Close => "CLOSE",
            FrameType::Other(byte) => return write!(f, "UNKNOWN(0x{byte:02x})"),
        };
        f.write_str(name)
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version byte.
    pub version: u8,
    /// Frame type.
    pub frame_type: FrameType,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Length of the payload as it appears on the wire.
    pub payload_length: u32,
    /// Per-frame unique id.
    pub message_id: MessageId,
    /// Conversation this frame belongs to (nil when not scoped).
    pub conversation_id: ConversationId,
    /// Sequence number (delivery seq inbound, send seq outbound).
    pub seq: u64,
}

impl Header {
    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0] = self.version;
        buf[1] = self.frame_type.into();
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[7..23].copy_from_slice(self.message_id.as_bytes());
        buf[23..39].copy_from_slice(self.conversation_id.as_bytes());
        buf[39..47].copy_from_slice(&self.seq.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut message_id = [0u8; 16];
        message_id.copy_from_slice(&buf[7..23]);
        let mut conversation_id = [0u8; 16];
        conversation_id.copy_from_slice(&buf[23..39]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[39..47]);

        Some(Self {
            version: buf[0],
            frame_type: FrameType::from(buf[1]),
            flags: buf[2],
            payload_length: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            message_id: MessageId::from_bytes(message_id),
            conversation_id: ConversationId::from_bytes(conversation_id),
            seq: u64::from_be_bytes(seq),
        })
    }

    /// Validate version and declared payload length.
    pub fn validate(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(CommsError::Protocol(format!(
                "unsupported protocol version {} (expected {})",
                self.version, PROTOCOL_VERSION
            )));
        }

        if self.payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(CommsError::PayloadTooLarge {
                size: self.payload_length as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(())
    }

    /// Check if the payload is compressed on the wire.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        flags::has_flag(self.flags, flags::COMPRESSED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: PROTOCOL_VERSION,
            frame_type: FrameType::MessageDelivery,
            flags: flags::EPHEMERAL,
            payload_length: 0x0102_0304,
            message_id: MessageId::from_bytes([0xAA; 16]),
            conversation_id: ConversationId::from_bytes([0xBB; 16]),
            seq: 0x1122_3344_5566_7788,
        }
    }

    #[test]
    fn test_header_size_is_exactly_47() {
        assert_eq!(HEADER_SIZE, 47);
        assert_eq!(sample_header().encode().len(), 47);
    }

    #[test]
    fn test_header_byte_layout() {
        let bytes = sample_header().encode();

        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], 0x07);
        assert_eq!(bytes[2], flags::EPHEMERAL);
        assert_eq!(&bytes[3..7], &[0x01, 0x02, 0x03, 0x04]);
        assert!(bytes[7..23].iter().all(|&b| b == 0xAA));
        assert!(bytes[23..39].iter().all(|&b| b == 0xBB));
        assert_eq!(
            &bytes[39..47],
            &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
    }

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = sample_header();
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_encode_fills_exactly_one_header() {
        let mut wire = sample_header().encode().to_vec();
        wire.extend_from_slice(b"payload");
        assert_eq!(sample_header().encode().len(), HEADER_SIZE);
        assert_eq!(Header::decode(&wire), Some(sample_header()));
        assert_eq!(&wire[HEADER_SIZE..], b"payload");
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_rejects_other_versions() {
        for version in [0u8, 2, 0xFF] {
            let header = Header {
                version,
                payload_length: 0,
                ..sample_header()
            };
            let err = header.validate().unwrap_err();
            assert!(err.to_string().contains("unsupported protocol version"));
        }
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header {
            payload_length: MAX_PAYLOAD_SIZE as u32 + 1,
            ..sample_header()
        };
        assert!(matches!(
            header.validate(),
            Err(CommsError::PayloadTooLarge { .. })
        ));

        let at_limit = Header {
            payload_length: MAX_PAYLOAD_SIZE as u32,
            ..sample_header()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_frame_type_wire_values_are_stable() {
        let expected = [
            (FrameType::Connect, 0x01),
            (FrameType::AuthOk, 0x02),
            (FrameType::AuthFail, 0x03),
            (FrameType::JoinConversation, 0x04),
            (FrameType::LeaveConversation, 0x05),
            (FrameType::SendMessage, 0x06),
            (FrameType::MessageDelivery, 0x07),
            (FrameType::Ack, 0x08),
            (FrameType::Presence, 0x09),
            (FrameType::Typing, 0x0A),
            (FrameType::SlowDown, 0x0B),
            (FrameType::Replay, 0x0C),
            (FrameType::Close, 0x0D),
        ];
        for (frame_type, byte) in expected {
            assert_eq!(u8::from(frame_type), byte);
            assert_eq!(FrameType::from(byte), frame_type);
        }
    }

    #[test]
    fn test_unknown_frame_type_survives() {
        assert_eq!(FrameType::from(0x42), FrameType::Other(0x42));
        assert_eq!(u8::from(FrameType::Other(0x42)), 0x42);
        assert_eq!(FrameType::Other(0x42).to_string(), "UNKNOWN(0x42)");
    }

    #[test]
    fn test_flags_has_flag() {
        let combined = flags::COMPRESSED | flags::EPHEMERAL;
        assert!(flags::has_flag(combined, flags::COMPRESSED));
        assert!(flags::has_flag(combined, flags::EPHEMERAL));
        assert!(!flags::has_flag(combined, flags::ENCRYPTED));
    }
}
