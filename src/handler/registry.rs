//! Handler registry for dispatching deliveries by content type.
//!
//! The registry maps content-type tags to handlers, frame types to
//! observation hooks, and holds the optional reconnect callback. A tag with
//! no entry is simply absent; the read loop logs and drops such deliveries.
//!
//! # Example
//!
//! ```ignore
//! use neboloop_comms::handler::{ChannelMessage, HandlerRegistry};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register(|msg: ChannelMessage, client| async move {
//!     client.send_channel_message(msg.meta.conversation_id, &msg).await?;
//!     Ok(())
//! });
//!
//! assert!(registry.has_handler("channel"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::messages::{Delivered, Delivery};
use crate::client::Client;
use crate::error::Result;
use crate::protocol::{Frame, FrameType};

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for delivery handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle one routed delivery.
    fn call(&self, delivery: Delivery, client: Client) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that deserializes content before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, Client) -> Fut + Send + Sync + 'static,
    T: Delivered,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, Client) -> Fut + Send + Sync + 'static,
    T: Delivered,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, Client) -> Fut + Send + Sync + 'static,
    T: Delivered,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, delivery: Delivery, client: Client) -> BoxFuture<'static, HandlerResult> {
        let parsed = match T::from_delivery(&delivery) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        Box::pin((self.handler)(parsed, client))
    }
}

/// Handler that receives the delivery with its content still raw.
pub struct RawHandler<F, Fut>
where
    F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
}

impl<F, Fut> RawHandler<F, Fut>
where
    F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new raw handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for RawHandler<F, Fut>
where
    F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, delivery: Delivery, client: Client) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(delivery, client))
    }
}

/// Observer for non-delivery frames.
pub type FrameHook = Arc<dyn Fn(Frame, Client) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Callback run after every successful reconnect.
pub type ReconnectHook = Arc<dyn Fn(Client) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Registry mapping content types to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Delivery handlers by content-type tag.
    handlers: HashMap<String, Arc<dyn Handler>>,
    /// Frame observers by frame type.
    frame_hooks: HashMap<FrameType, FrameHook>,
    /// Reconnect callback.
    reconnect: Option<ReconnectHook>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler under `T::CONTENT_TYPE`.
    ///
    /// Replaces any handler previously registered for that tag.
    pub fn register<F, T, Fut>(&mut self, handler: F)
    where
        F: Fn(T, Client) -> Fut + Send + Sync + 'static,
        T: Delivered,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers
            .insert(T::CONTENT_TYPE.to_string(), Arc::new(TypedHandler::new(handler)));
    }

    /// Register a raw handler for an arbitrary content-type tag.
    pub fn register_raw<F, Fut>(&mut self, content_type: &str, handler: F)
    where
        F: Fn(Delivery, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers
            .insert(content_type.to_string(), Arc::new(RawHandler::new(handler)));
    }

    /// Register an observer for one frame type.
    pub fn register_frame_hook<F, Fut>(&mut self, frame_type: FrameType, hook: F)
    where
        F: Fn(Frame, Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let hook: FrameHook = Arc::new(
            move |frame: Frame, client: Client| -> BoxFuture<'static, HandlerResult> {
                Box::pin(hook(frame, client))
            },
        );
        self.frame_hooks.insert(frame_type, hook);
    }

    /// Set the reconnect callback.
    pub fn set_reconnect_hook<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let hook: ReconnectHook =
            Arc::new(move |client: Client| -> BoxFuture<'static, HandlerResult> {
                Box::pin(hook(client))
            });
        self.reconnect = Some(hook);
    }

    /// Get the handler for a content type.
    pub fn get_handler(&self, content_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(content_type).cloned()
    }

    /// Check whether a content type has a handler.
    pub fn has_handler(&self, content_type: &str) -> bool {
        self.handlers.contains_key(content_type)
    }

    /// Registered content-type tags, sorted.
    pub fn content_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.handlers.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Get the observer for a frame type.
    pub fn frame_hook(&self, frame_type: FrameType) -> Option<FrameHook> {
        self.frame_hooks.get(&frame_type).cloned()
    }

    /// Get the reconnect callback.
    pub fn reconnect_hook(&self) -> Option<ReconnectHook> {
        self.reconnect.clone()
    }
}
