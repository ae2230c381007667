//! Protocol module - wire format, identifiers, frames and payload shapes.
//!
//! This module implements the binary protocol spoken with the gateway:
//! - 47-byte header encoding/decoding
//! - Frame codec with payload cap and optional compression
//! - Conversation / message identifiers
//! - JSON payload structs for each frame type

mod frame;
mod ids;
pub mod messages;
mod wire_format;

pub use frame::{decode_frame, encode_frame, read_frame, Frame};
pub use ids::{ConversationId, MessageId};
pub use wire_format::{
    flags, FrameType, Header, COMPRESSION_THRESHOLD, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};
