//! Conversation and message identifiers.
//!
//! Both are 128-bit values carried raw in the frame header. Conversation ids
//! are UUIDv4; message ids follow the ULID layout (48-bit millisecond
//! timestamp followed by 80 random bits) so they sort by creation time.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use uuid::Uuid;

use crate::error::CommsError;

/// Identifier grouping related messages (a channel thread, an A2A exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Generate a fresh random conversation id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id, used when a frame is not scoped to one conversation.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Wrap raw header bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes as laid out in the header.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// True for the all-zero id.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Lowercase 32-char hex form used as a key in JSON payloads.
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl From<Uuid> for ConversationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ConversationId {
    type Err = CommsError;

    /// Accepts both the plain hex form and the hyphenated UUID form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|e| CommsError::Protocol(format!("invalid conversation id {s:?}: {e}")))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Crockford base32 alphabet used for the ULID text form.
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Time-orderable per-frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MessageId([u8; 16]);

impl MessageId {
    /// Generate a new id stamped with the current time.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::with_timestamp(millis)
    }

    /// Generate an id for the given unix millisecond timestamp.
    pub fn with_timestamp(millis: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..6].copy_from_slice(&millis.to_be_bytes()[2..]);
        rand::rng().fill(&mut bytes[6..]);
        Self(bytes)
    }

    /// Wrap raw header bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes as laid out in the header.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Unix millisecond timestamp embedded in the id.
    pub fn timestamp_ms(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&self.0[..6]);
        u64::from_be_bytes(buf)
    }
}

impl fmt::Display for MessageId {
    /// 26-character Crockford base32, the canonical ULID text form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = u128::from_be_bytes(self.0);
        let mut out = [0u8; 26];
        for (i, slot) in out.iter_mut().enumerate() {
            let shift = 125 - i * 5;
            *slot = CROCKFORD[((value >> shift) & 0x1F) as usize];
        }
        // CROCKFORD is ASCII
        f.write_str(std::str::from_utf8(&out).map_err(|_| fmt::Error)?)
    }
}
