//! Shared connection state and the connection state machine.
//!
//! ```text
//! Disconnected ─► Dialing ─► AwaitingAuth ─► Connected
//!       ▲                         │              │
//!       └─────────────────────────┴──────────────┘  (transport loss)
//!                                 │
//!                                 ▼
//!                             AuthDead          Closed (from anywhere)
//! ```
//!
//! Every successful handshake starts a new connection generation. The read
//! loop and the writer are tagged with it, so a late failure from an old
//! socket is recognized and ignored.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ack::AckTracker;
use crate::config::{ClientOptions, Config};
use crate::control::authenticate;
use crate::error::{CommsError, Result};
use crate::handler::HandlerRegistry;
use crate::protocol::messages::AuthOkPayload;
use crate::protocol::{encode_frame, ConversationId, Frame};
use crate::supervisor;
use crate::transport::{dial, WsReceiver, WsSender};
use crate::writer::{FrameWriter, WriteFailure};

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// No socket; a reconnect may be pending.
    Disconnected,
    /// Opening the socket.
    Dialing,
    /// CONNECT sent, waiting for the reply.
    AwaitingAuth,
    /// Authenticated and reading.
    Connected,
    /// The gateway rejected our credentials. Terminal.
    AuthDead,
    /// `close` was called. Terminal.
    Closed,
}

impl ConnState {
    /// True for states nothing but `close` can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::AuthDead | ConnState::Closed)
    }
}

/// State guarded by the shared reader/writer lock.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: ConnState,
    pub session_id: Option<String>,
    pub acks: AckTracker,
    pub generation: u64,
}

/// Everything a client handle points at.
pub(crate) struct Inner {
    pub config: Config,
    pub options: ClientOptions,
    shared: RwLock<Shared>,
    registry: RwLock<HandlerRegistry>,
    pub writer: FrameWriter,
    /// Send-side sequence, global across conversations.
    send_seq: AtomicU64,
    /// Set while a supervisor task is running.
    pub reconnecting: AtomicBool,
    /// Fires once, on `close`.
    pub shutdown: CancellationToken,
}

impl Inner {
    pub fn new(config: Config, options: ClientOptions, registry: HandlerRegistry) -> Self {
        let writer = FrameWriter::new(options.write_timeout);
        Self {
            config,
            options,
            shared: RwLock::new(Shared {
                state: ConnState::Disconnected,
                session_id: None,
                acks: AckTracker::new(),
                generation: 0,
            }),
            registry: RwLock::new(registry),
            writer,
            send_seq: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    // Poisoned locks are recovered; every writer leaves the data consistent.
    pub fn read_shared(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_shared(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handlers(&self) -> RwLockReadGuard<'_, HandlerRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handlers_mut(&self) -> RwLockWriteGuard<'_, HandlerRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnState {
        self.read_shared().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnState::Connected
    }

    pub fn is_auth_dead(&self) -> bool {
        self.read_shared().state == ConnState::AuthDead
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Move to `next` unless the current state is terminal.
    fn transition(&self, next: ConnState) -> bool {
        let mut shared = self.write_shared();
        if shared.state.is_terminal() {
            return false;
        }
        shared.state = next;
        true
    }

    /// True if `generation` is the live connection.
    pub fn is_current(&self, generation: u64) -> bool {
        let shared = self.read_shared();
        shared.generation == generation && shared.state == ConnState::Connected
    }

    pub fn record_ack(&self, conversation_id: ConversationId, seq: u64) -> u64 {
        self.write_shared().acks.record(conversation_id, seq)
    }

    pub fn last_acked(&self, conversation_id: &ConversationId) -> Option<u64> {
        self.read_shared().acks.last_acked(conversation_id)
    }

    pub fn ack_snapshot(&self) -> Vec<(ConversationId, u64)> {
        self.read_shared().acks.snapshot()
    }

    pub fn next_send_seq(&self) -> u64 {
        self.send_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Dial, authenticate and install a new connection generation.
    ///
    /// Returns the new generation and its read half; the caller starts the
    /// read loop. An AUTH_FAIL moves the client to `AuthDead` for good.
    pub async fn establish(&self, timeout: Duration) -> Result<(u64, WsReceiver)> {
        if self.is_closed() || !self.transition(ConnState::Dialing) {
            return Err(CommsError::Closed);
        }

        let outcome = tokio::time::timeout(timeout, self.dial_and_authenticate())
            .await
            .unwrap_or(Err(CommsError::ConnectTimeout));

        let (sender, receiver, auth) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                let next = if matches!(e, CommsError::Auth { .. }) {
                    ConnState::AuthDead
                } else {
                    ConnState::Disconnected
                };
                self.transition(next);
                return Err(e);
            }
        };

        let generation = {
            let mut shared = self.write_shared();
            shared.generation += 1;
            shared.generation
        };
        if let Some(mut old) = self.writer.install(generation, sender).await {
            let _ = old.close().await;
        }

        {
            let mut shared = self.write_shared();
            if !shared.state.is_terminal() && shared.generation == generation {
                shared.state = ConnState::Connected;
                shared.session_id = Some(auth.session_id.clone());
            }
        }
        // Close raced with the handshake.
        if self.is_closed() {
            if let Some(mut sender) = self.writer.retire(generation).await {
                let _ = sender.close().await;
            }
            return Err(CommsError::Closed);
        }

        tracing::info!(
            session_id = %auth.session_id,
            generation,
            "authenticated with gateway"
        );
        Ok((generation, receiver))
    }

    async fn dial_and_authenticate(&self) -> Result<(WsSender, WsReceiver, AuthOkPayload)> {
        let (mut sender, mut receiver) = dial(&self.config.gateway_url).await?;
        self.transition(ConnState::AwaitingAuth);
        tracing::debug!(bot_id = %self.config.bot_id, "dialed gateway, sending CONNECT");

        match authenticate(&self.config, &mut sender, &mut receiver).await {
            Ok(auth) => Ok((sender, receiver, auth)),
            Err(e) => {
                let _ = sender.close().await;
                Err(e)
            }
        }
    }

    /// Mark `generation` as lost and start the supervisor if it was live.
    pub fn connection_lost(self: &Arc<Self>, generation: u64, reason: &CommsError) {
        {
            let mut shared = self.write_shared();
            if shared.generation != generation || shared.state != ConnState::Connected {
                tracing::debug!(generation, error = %reason, "ignoring loss of stale connection");
                return;
            }
            shared.state = ConnState::Disconnected;
        }
        tracing::warn!(generation, error = %reason, "connection to gateway lost");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(mut sender) = inner.writer.retire(generation).await {
                let _ = sender.close().await;
            }
        });

        if !self.is_closed() {
            supervisor::spawn_reconnect(Arc::clone(self));
        }
    }

    /// Encode and write one frame.
    ///
    /// A transport failure marks the generation it happened on as lost.
    pub async fn write_frame(self: &Arc<Self>, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(CommsError::Closed);
        }
        let bytes = encode_frame(frame)?;
        match self.writer.write(bytes).await {
            Ok(()) => {
                tracing::trace!(
                    frame_type = %frame.frame_type,
                    conversation_id = %frame.conversation_id,
                    seq = frame.seq,
                    "frame written"
                );
                Ok(())
            }
            Err(WriteFailure { generation, error }) => {
                if let Some(generation) = generation {
                    self.connection_lost(generation, &error);
                }
                Err(error)
            }
        }
    }

    /// Idempotent shutdown. Returns false if already closed.
    pub async fn close(&self) -> bool {
        {
            let mut shared = self.write_shared();
            if shared.state == ConnState::Closed {
                return false;
            }
            shared.state = ConnState::Closed;
        }
        self.shutdown.cancel();
        if let Some(mut sender) = self.writer.take().await {
            let _ = sender.close().await;
        }
        tracing::info!(bot_id = %self.config.bot_id, "client closed");
        true
    }
}
