//! # neboloop-comms
//!
//! Rust client SDK for the NeboLoop Comms gateway.
//!
//! A bot holds one persistent WebSocket to the gateway and exchanges binary
//! frames over it: a fixed 47-byte header followed by a JSON payload that is
//! gzip-compressed when that makes it smaller.
//!
//! ## Architecture
//!
//! - **Handshake**: CONNECT with bot id and credential, exactly one AUTH_OK
//!   or AUTH_FAIL in reply
//! - **Read loop**: one per connection, acks every delivery on receipt and
//!   routes it by content type to a registered handler
//! - **Supervisor**: reconnects with capped, jittered backoff and rejoins
//!   every conversation from its last acked seq
//! - **Heartbeat**: PRESENCE "online" on a fixed period while connected
//!
//! ## Example
//!
//! ```ignore
//! use neboloop_comms::{Client, Config, Credential, TaskResult, TaskSubmission};
//!
//! #[tokio::main]
//! async fn main() -> neboloop_comms::Result<()> {
//!     let config = Config::new("wss://comms.example.com/ws", "bot-1", Credential::ApiKey(key));
//!
//!     let client = Client::builder(config)
//!         .on_task(|task: TaskSubmission, client| async move {
//!             let result = TaskResult {
//!                 task_id: task.task_id.clone(),
//!                 correlation_id: task.correlation_id.clone(),
//!                 status: "completed".into(),
//!                 output: Some(task.input.clone()),
//!                 ..TaskResult::default()
//!             };
//!             client.send_task_result(task.meta.conversation_id, &result).await?;
//!             Ok(())
//!         })
//!         .connect()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod ack;
mod backoff;
mod client;
mod config;
mod connection;
mod read_loop;
mod supervisor;
mod writer;

pub use backoff::{backoff_ceiling, backoff_delay};
pub use client::{Client, ClientBuilder};
pub use config::{ClientOptions, Config, Credential};
pub use connection::ConnState;
pub use error::{CommsError, Result};
pub use handler::{
    ChannelMessage, Delivery, DeliveryMeta, DirectMessage, InstallEvent, TaskResult,
    TaskSubmission,
};
pub use protocol::{ConversationId, Frame, FrameType, MessageId};
