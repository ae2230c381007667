//! Typed delivery content.
//!
//! Each struct is the `content` object of one content type. The same structs
//! are used for sending; the [`DeliveryMeta`] part is filled from the frame
//! and envelope on receipt and never serialized.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::messages::DeliveryEnvelope;
use crate::protocol::{ConversationId, Frame, MessageId};

/// Content-type tags understood out of the box.
pub mod content_types {
    pub const INSTALL: &str = "install";
    pub const CHANNEL: &str = "channel";
    pub const TASK: &str = "task";
    pub const TASK_RESULT: &str = "task_result";
    pub const DIRECT: &str = "direct";
}

/// Where a delivery came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryMeta {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub seq: u64,
    pub sender_id: String,
    pub stream: Option<String>,
}

/// A MESSAGE_DELIVERY frame with its envelope unpacked, content still raw.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub meta: DeliveryMeta,
    pub content_type: String,
    pub content: Box<RawValue>,
}

impl Delivery {
    /// Unpack the envelope of a MESSAGE_DELIVERY frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let envelope: DeliveryEnvelope = JsonCodec::decode(frame.payload())?;
        Ok(Self {
            meta: DeliveryMeta {
                conversation_id: frame.conversation_id,
                message_id: frame.message_id,
                seq: frame.seq,
                sender_id: envelope.sender_id,
                stream: envelope.stream,
            },
            content_type: envelope.content_type,
            content: envelope.content,
        })
    }

    /// Deserialize the content into `T`.
    pub fn content<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(self.content.get())?)
    }
}

/// Content that knows its tag and can carry delivery metadata.
pub trait Delivered: DeserializeOwned + Send + 'static {
    /// Content-type tag this struct is registered under.
    const CONTENT_TYPE: &'static str;

    /// Mutable access to the metadata slot.
    fn meta_mut(&mut self) -> &mut DeliveryMeta;

    /// Build from a routed delivery.
    fn from_delivery(delivery: &Delivery) -> Result<Self> {
        let mut value: Self = delivery.content()?;
        *value.meta_mut() = delivery.meta.clone();
        Ok(value)
    }
}

/// App/skill install lifecycle notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip)]
    pub meta: DeliveryMeta,
}

/// Message bridged from an external chat channel (Telegram, Slack, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip)]
    pub meta: DeliveryMeta,
}

/// Agent-to-agent task request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip)]
    pub meta: DeliveryMeta,
}

/// Agent-to-agent task outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub meta: DeliveryMeta,
}

/// Direct bot-to-bot or user-to-bot message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip)]
    pub meta: DeliveryMeta,
}

impl Delivered for InstallEvent {
    const CONTENT_TYPE: &'static str = content_types::INSTALL;
    fn meta_mut(&mut self) -> &mut DeliveryMeta {
        &mut self.meta
    }
}

impl Delivered for ChannelMessage {
    const CONTENT_TYPE: &'static str = content_types::CHANNEL;
    fn meta_mut(&mut self) -> &mut DeliveryMeta {
        &mut self.meta
    }
}

impl Delivered for TaskSubmission {
    const CONTENT_TYPE: &'static str = content_types::TASK;
    fn meta_mut(&mut self) -> &mut DeliveryMeta {
        &mut self.meta
    }
}

impl Delivered for TaskResult {
    const CONTENT_TYPE: &'static str = content_types::TASK_RESULT;
    fn meta_mut(&mut self) -> &mut DeliveryMeta {
        &mut self.meta
    }
}

impl Delivered for DirectMessage {
    const CONTENT_TYPE: &'static str = content_types::DIRECT;
    fn meta_mut(&mut self) -> &mut DeliveryMeta {
        &mut self.meta
    }
}
