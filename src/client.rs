//! Client builder and public API.
//!
//! The [`ClientBuilder`] collects handlers and timing options, then
//! [`ClientBuilder::connect`] runs the lifecycle:
//! 1. Dial the gateway and authenticate (bounded by `connect_timeout`)
//! 2. Start the read loop for the first connection generation
//! 3. Start the heartbeat
//!
//! From then on the client reconnects by itself after transport failures,
//! until [`Client::close`] is called or the gateway rejects the credentials.
//!
//! # Example
//!
//! ```ignore
//! use neboloop_comms::{ChannelMessage, Client, Config, Credential};
//!
//! #[tokio::main]
//! async fn main() -> neboloop_comms::Result<()> {
//!     let config = Config::new("wss://comms.example.com/ws", "bot-1", Credential::Token(token));
//!
//!     let client = Client::builder(config)
//!         .on_channel_message(|msg: ChannelMessage, client| async move {
//!             let reply = ChannelMessage { text: format!("echo: {}", msg.text), ..msg.clone() };
//!             client.send_channel_message(msg.meta.conversation_id, &reply).await?;
//!             Ok(())
//!         })
//!         .on_reconnect(|_client| async { Ok(()) })
//!         .connect()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await
//! }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::value::to_raw_value;

use crate::codec::JsonCodec;
use crate::config::{ClientOptions, Config};
use crate::connection::{ConnState, Inner};
use crate::error::Result;
use crate::handler::{
    ChannelMessage, Delivered, Delivery, DirectMessage, HandlerRegistry, HandlerResult,
    InstallEvent, TaskResult, TaskSubmission,
};
use crate::protocol::messages::{JoinPayload, PresencePayload, SendMessagePayload, TypingPayload};
use crate::protocol::{ConversationId, Frame, FrameType};
use crate::{read_loop, supervisor};

/// Builder for configuring and connecting a client.
pub struct ClientBuilder {
    config: Config,
    options: ClientOptions,
    registry: HandlerRegistry,
}

impl ClientBuilder {
    /// Create a builder with default options and no handlers.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            options: ClientOptions::default(),
            registry: HandlerRegistry::new(),
        }
    }

    /// Register a handler for install lifecycle events.
    pub fn on_install<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(InstallEvent, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on::<InstallEvent, _, _>(handler)
    }

    /// Register a handler for bridged channel messages.
    pub fn on_channel_message<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(ChannelMessage, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on::<ChannelMessage, _, _>(handler)
    }

    /// Register a handler for incoming task requests.
    pub fn on_task<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(TaskSubmission, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on::<TaskSubmission, _, _>(handler)
    }

    /// Register a handler for task results.
    pub fn on_task_result<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(TaskResult, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on::<TaskResult, _, _>(handler)
    }

    /// Register a handler for direct messages.
    pub fn on_direct_message<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(DirectMessage, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on::<DirectMessage, _, _>(handler)
    }

    /// Register a typed handler for any [`Delivered`] content.
    pub fn on<T, F, Fut>(mut self, handler: F) -> Self
    where
        T: Delivered,
        F: Fn(T, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(handler);
        self
    }

    /// Register a raw handler for an arbitrary content-type tag.
    pub fn on_delivery<F, Fut>(mut self, content_type: &str, handler: F) -> Self
    where
        F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_raw(content_type, handler);
        self
    }

    /// Observe inbound frames of one type after their default handling.
    pub fn on_frame<F, Fut>(mut self, frame_type: FrameType, hook: F) -> Self
    where
        F: Fn(Frame, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_frame_hook(frame_type, hook);
        self
    }

    /// Run `hook` after every successful reconnect.
    pub fn on_reconnect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.set_reconnect_hook(hook);
        self
    }

    /// Replace all timing options.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Bound on dial + auth for the first connect.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Deadline for each outbound write.
    ///
    /// Default: 5 seconds
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.options.write_timeout = timeout;
        self
    }

    /// PRESENCE heartbeat period. Zero disables the heartbeat.
    ///
    /// Default: 20 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.options.heartbeat_interval = interval;
        self
    }

    /// Reconnect backoff base and cap.
    ///
    /// Default: 100 milliseconds, 10 seconds
    pub fn reconnect_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.options.reconnect_base = base;
        self.options.reconnect_cap = cap;
        self
    }

    /// Bound on dial + auth for each reconnect attempt.
    ///
    /// Default: 10 seconds
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.options.reconnect_timeout = timeout;
        self
    }

    /// Connect, authenticate and start the background tasks.
    ///
    /// # Errors
    ///
    /// Invalid config, dial failure, `ConnectTimeout`, `Auth` on AUTH_FAIL,
    /// or `Protocol` for any other reply to CONNECT.
    pub async fn connect(self) -> Result<Client> {
        self.config.validate()?;

        let inner = Arc::new(Inner::new(self.config, self.options, self.registry));
        let (generation, receiver) = inner.establish(inner.options.connect_timeout).await?;

        read_loop::spawn(Arc::clone(&inner), generation, receiver);
        supervisor::spawn_heartbeat(Arc::clone(&inner));

        Ok(Client { inner })
    }
}

/// A connected client handle.
///
/// Cheap to clone; every clone drives the same connection. Background tasks
/// keep running until [`Client::close`] is called, even if every handle is
/// dropped.
///
/// Handlers run inline on the read loop and receive a clone of the client,
/// so they can reply directly. A slow handler holds up every frame behind
/// it, including ACKs.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a builder for `config`.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connect with default options and no handlers.
    pub async fn connect(config: Config) -> Result<Client> {
        ClientBuilder::new(config).connect().await
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Shut the client down. Safe to call more than once, from anywhere.
    ///
    /// Stops the read loop, the heartbeat and any pending reconnect, and
    /// closes the socket.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await;
        Ok(())
    }

    /// True while authenticated on a live socket.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Session id from the most recent AUTH_OK.
    pub fn session_id(&self) -> Option<String> {
        self.inner.read_shared().session_id.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.inner.state()
    }

    /// Highest delivery seq acknowledged on a conversation.
    pub fn last_acked(&self, conversation_id: &ConversationId) -> Option<u64> {
        self.inner.last_acked(conversation_id)
    }

    /// Bot id this client authenticated as.
    pub fn bot_id(&self) -> &str {
        &self.inner.config.bot_id
    }

    /// Register or replace the install handler.
    pub fn on_install<F, Fut>(&self, handler: F)
    where
        F: Fn(InstallEvent, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register(handler);
    }

    /// Register or replace the channel message handler.
    pub fn on_channel_message<F, Fut>(&self, handler: F)
    where
        F: Fn(ChannelMessage, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register(handler);
    }

    /// Register or replace the task handler.
    pub fn on_task<F, Fut>(&self, handler: F)
    where
        F: Fn(TaskSubmission, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register(handler);
    }

    /// Register or replace the task result handler.
    pub fn on_task_result<F, Fut>(&self, handler: F)
    where
        F: Fn(TaskResult, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register(handler);
    }

    /// Register or replace the direct message handler.
    pub fn on_direct_message<F, Fut>(&self, handler: F)
    where
        F: Fn(DirectMessage, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register(handler);
    }

    /// Register or replace a raw handler for any content-type tag.
    pub fn on_delivery<F, Fut>(&self, content_type: &str, handler: F)
    where
        F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register_raw(content_type, handler);
    }

    /// Register or replace the observer for one frame type.
    pub fn on_frame<F, Fut>(&self, frame_type: FrameType, hook: F)
    where
        F: Fn(Frame, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().register_frame_hook(frame_type, hook);
    }

    /// Register or replace the reconnect callback.
    pub fn on_reconnect<F, Fut>(&self, hook: F)
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers_mut().set_reconnect_hook(hook);
    }

    /// Content-type tags that currently have a handler, sorted.
    pub fn registered_content_types(&self) -> Vec<String> {
        self.inner.handlers().content_types()
    }

    /// Send a channel message. Returns the assigned send seq.
    pub async fn send_channel_message(
        &self,
        conversation_id: ConversationId,
        message: &ChannelMessage,
    ) -> Result<u64> {
        self.send_envelope(conversation_id, ChannelMessage::CONTENT_TYPE, message, None, None)
            .await
    }

    /// Submit a task. Its correlation id is copied into the envelope.
    pub async fn submit_task(
        &self,
        conversation_id: ConversationId,
        task: &TaskSubmission,
    ) -> Result<u64> {
        self.send_envelope(
            conversation_id,
            TaskSubmission::CONTENT_TYPE,
            task,
            None,
            task.correlation_id.clone(),
        )
        .await
    }

    /// Send a task result. Its correlation id is copied into the envelope.
    pub async fn send_task_result(
        &self,
        conversation_id: ConversationId,
        result: &TaskResult,
    ) -> Result<u64> {
        self.send_envelope(
            conversation_id,
            TaskResult::CONTENT_TYPE,
            result,
            None,
            result.correlation_id.clone(),
        )
        .await
    }

    /// Send a direct message.
    pub async fn send_direct(
        &self,
        conversation_id: ConversationId,
        message: &DirectMessage,
    ) -> Result<u64> {
        self.send_envelope(conversation_id, DirectMessage::CONTENT_TYPE, message, None, None)
            .await
    }

    /// Send any JSON content under any content-type tag.
    ///
    /// Every send takes the next value of one client-wide sequence counter,
    /// starting at 1. The seq is returned once the frame is written; there
    /// is no delivery confirmation beyond that.
    ///
    /// # Errors
    ///
    /// Codec errors, `PayloadTooLarge`, `NotConnected`, `Closed`, or the
    /// transport error of a failed write (which also starts a reconnect).
    pub async fn send_message<T: Serialize + ?Sized>(
        &self,
        conversation_id: ConversationId,
        content_type: &str,
        content: &T,
        stream: Option<&str>,
    ) -> Result<u64> {
        self.send_envelope(
            conversation_id,
            content_type,
            content,
            stream.map(str::to_string),
            None,
        )
        .await
    }

    async fn send_envelope<T: Serialize + ?Sized>(
        &self,
        conversation_id: ConversationId,
        content_type: &str,
        content: &T,
        stream: Option<String>,
        correlation_id: Option<String>,
    ) -> Result<u64> {
        let envelope = SendMessagePayload {
            content_type: content_type.to_string(),
            content: to_raw_value(content)?,
            stream,
            correlation_id,
        };
        let payload = JsonCodec::encode_bytes(&envelope)?;

        let seq = self.inner.next_send_seq();
        let frame = Frame::new(FrameType::SendMessage, conversation_id, seq, payload);
        self.inner.write_frame(&frame).await?;
        Ok(seq)
    }

    /// Join conversations, asking the gateway to replay past our last ack.
    ///
    /// Each id maps to its last acked seq, or 0 if nothing was received on
    /// it yet. The header carries the conversation id only for a single-id
    /// join; otherwise it is nil and the payload map is authoritative.
    pub async fn join(&self, conversation_ids: &[ConversationId]) -> Result<()> {
        let frame = self.build_join(conversation_ids)?;
        tracing::debug!(conversations = conversation_ids.len(), "joining conversations");
        self.inner.write_frame(&frame).await
    }

    fn build_join(&self, conversation_ids: &[ConversationId]) -> Result<Frame> {
        let payload = {
            let shared = self.inner.read_shared();
            let last_acked_seqs: BTreeMap<String, u64> = conversation_ids
                .iter()
                .map(|id| (id.to_hex(), shared.acks.last_acked(id).unwrap_or(0)))
                .collect();
            JoinPayload { last_acked_seqs }
        };

        let header_id = match conversation_ids {
            [only] => *only,
            _ => ConversationId::nil(),
        };
        Ok(Frame::new(
            FrameType::JoinConversation,
            header_id,
            0,
            JsonCodec::encode_bytes(&payload)?,
        ))
    }

    /// Leave a conversation.
    pub async fn leave(&self, conversation_id: ConversationId) -> Result<()> {
        let frame = Frame::new(FrameType::LeaveConversation, conversation_id, 0, Bytes::new());
        self.inner.write_frame(&frame).await
    }

    /// Send a typing indicator on a conversation.
    pub async fn send_typing(&self, conversation_id: ConversationId, typing: bool) -> Result<()> {
        let payload = JsonCodec::encode_bytes(&TypingPayload { typing })?;
        let frame = Frame::new(FrameType::Typing, conversation_id, 0, payload);
        self.inner.write_frame(&frame).await
    }

    /// Publish a presence status (the heartbeat sends "online").
    pub async fn set_presence(&self, status: &str) -> Result<()> {
        let payload = JsonCodec::encode_bytes(&PresencePayload {
            status: status.to_string(),
        })?;
        let frame = Frame::new(FrameType::Presence, ConversationId::nil(), 0, payload);
        self.inner.write_frame(&frame).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("bot_id", &self.inner.config.bot_id)
            .field("state", &self.state())
            .finish()
    }
}
