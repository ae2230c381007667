//! Serialized frame writer.
//!
//! Every outbound frame goes through one lock so the wire stream is never
//! interleaved, and every write carries a deadline so a stalled socket cannot
//! block the caller forever.
//!
//! # Architecture
//!
//! ```text
//! Send* / Join / Leave ─┐
//! ACK (read loop)      ─┼─► FrameWriter (Mutex<Option<Slot>>) ─► WsSender
//! Heartbeat            ─┘
//! ```
//!
//! The slot is tagged with the connection generation that installed it. On a
//! failed write the slot is cleared and the generation is handed back so the
//! caller can report exactly that connection as lost.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::CommsError;
use crate::transport::WsSender;

/// Default per-write deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A sender installed for one connection generation.
struct Slot {
    generation: u64,
    sender: WsSender,
}

/// A write that failed, with the generation it was attempted on.
#[derive(Debug)]
pub(crate) struct WriteFailure {
    /// Generation whose socket failed; `None` when nothing was installed.
    pub generation: Option<u64>,
    /// Underlying error.
    pub error: CommsError,
}

/// Write half shared by every sender in the client.
pub(crate) struct FrameWriter {
    slot: Mutex<Option<Slot>>,
    timeout: Duration,
}

impl FrameWriter {
    /// Create an empty writer with the given per-write deadline.
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            timeout,
        }
    }

    /// Install the sender of a new connection generation.
    ///
    /// Returns the previous sender, if any, so the caller can close it.
    pub async fn install(&self, generation: u64, sender: WsSender) -> Option<WsSender> {
        let mut slot = self.slot.lock().await;
        slot.replace(Slot { generation, sender }).map(|old| old.sender)
    }

    /// Remove the current sender.
    pub async fn take(&self) -> Option<WsSender> {
        self.slot.lock().await.take().map(|s| s.sender)
    }

    /// Remove the sender only if it still belongs to `generation`.
    pub async fn retire(&self, generation: u64) -> Option<WsSender> {
        let mut slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(current) if current.generation == generation => slot.take().map(|s| s.sender),
            _ => None,
        }
    }

    /// Write one encoded frame.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<(), WriteFailure> {
        let mut guard = self.slot.lock().await;
        let Some(slot) = guard.as_mut() else {
            return Err(WriteFailure {
                generation: None,
                error: CommsError::NotConnected,
            });
        };
        let generation = slot.generation;

        let error = match tokio::time::timeout(self.timeout, slot.sender.send_binary(bytes)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => CommsError::WriteTimeout,
        };

        // The socket is unusable after a failed or timed-out write.
        guard.take();
        Err(WriteFailure {
            generation: Some(generation),
            error,
        })
    }
}
