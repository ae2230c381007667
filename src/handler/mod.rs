//! Handler module - typed content and delivery dispatch.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps content-type tags to handlers
//! - typed content structs ([`ChannelMessage`], [`TaskSubmission`], ...)
//!   used both for receiving and for sending
//!
//! Handlers run inline on the read loop. A slow handler delays every frame
//! behind it on that connection, including ACKs for later deliveries; hand
//! long work off to your own task or queue.
//!
//! # Example
//!
//! ```ignore
//! use neboloop_comms::handler::{HandlerRegistry, TaskSubmission, TaskResult};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register(|task: TaskSubmission, client| async move {
//!     let result = TaskResult {
//!         task_id: task.task_id.clone(),
//!         correlation_id: task.correlation_id.clone(),
//!         status: "completed".into(),
//!         output: Some(task.input.to_uppercase()),
//!         ..TaskResult::default()
//!     };
//!     client.send_task_result(task.meta.conversation_id, &result).await?;
//!     Ok(())
//! });
//! ```

mod messages;
mod registry;

pub use messages::{
    content_types, ChannelMessage, Delivered, Delivery, DeliveryMeta, DirectMessage, InstallEvent,
    TaskResult, TaskSubmission,
};
pub use registry::{
    BoxFuture, FrameHook, Handler, HandlerRegistry, HandlerResult, RawHandler, ReconnectHook,
    TypedHandler,
};
