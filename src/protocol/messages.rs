//! JSON payload shapes carried inside frames.
//!
//! One struct per frame type that has a payload. Optional fields are skipped
//! when absent so the wire form stays minimal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// CONNECT: identity and credentials presented to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectPayload {
    pub bot_id: String,
    pub credential: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// AUTH_OK: the gateway accepted us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthOkPayload {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub session_id: String,
}

/// AUTH_FAIL: the gateway rejected us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthFailPayload {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub code: String,
}

/// SEND_MESSAGE: outbound envelope around typed content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub content_type: String,
    pub content: Box<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// MESSAGE_DELIVERY: inbound envelope around typed content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    #[serde(default)]
    pub sender_id: String,
    pub content_type: String,
    pub content: Box<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

/// JOIN_CONVERSATION: last acked seq per conversation (hex id) for delta replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JoinPayload {
    pub last_acked_seqs: BTreeMap<String, u64>,
}

/// ACK: confirms receipt of `acked_seq` on a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub acked_seq: u64,
}

/// PRESENCE: liveness / availability status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresencePayload {
    pub status: String,
}

/// TYPING: typing indicator for a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingPayload {
    pub typing: bool,
}

/// SLOW_DOWN: gateway back-pressure hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SlowDownPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// REPLAY (resume summary): gaps the gateway observed per conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReplayPayload {
    #[serde(default)]
    pub gaps: Vec<ReplayGap>,
}

/// One conversation's hole in the delivered sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayGap {
    pub conversation_id: String,
    pub last_seq: u64,
    pub current_seq: u64,
    pub gap_size: u64,
}
