//! Reconnection supervisor and heartbeat.
//!
//! The supervisor is started by the first observer of a connection loss
//! (read loop or writer). An atomic flag keeps it to one task at a time;
//! attempts inside it run strictly one after another.
//!
//! The heartbeat is started once per client and lives until `close`. While
//! disconnected its ticks do nothing, so it is never restarted.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};

use crate::backoff::backoff_delay;
use crate::client::Client;
use crate::codec::JsonCodec;
use crate::connection::Inner;
use crate::error::CommsError;
use crate::protocol::messages::PresencePayload;
use crate::protocol::{ConversationId, Frame, FrameType};
use crate::read_loop;
use crate::transport::WsReceiver;

/// Start the supervisor unless one is already running.
pub(crate) fn spawn_reconnect(inner: Arc<Inner>) {
    if inner.reconnecting.swap(true, Ordering::AcqRel) {
        tracing::debug!("reconnect already in progress");
        return;
    }

    tokio::spawn(async move {
        let outcome = reconnect(&inner).await;
        // Cleared before resuming so a loss during resume can start a new run.
        inner.reconnecting.store(false, Ordering::Release);
        if let Some((generation, receiver)) = outcome {
            resume(&inner, generation, receiver).await;
        }
    });
}

/// Retry the handshake until it succeeds, auth dies, or the client closes.
async fn reconnect(inner: &Arc<Inner>) -> Option<(u64, WsReceiver)> {
    let mut attempt: u32 = 0;

    loop {
        if inner.is_auth_dead() {
            tracing::warn!("credentials were rejected, not reconnecting");
            return None;
        }
        if inner.is_closed() {
            return None;
        }

        attempt = attempt.saturating_add(1);
        let delay = backoff_delay(
            attempt,
            inner.options.reconnect_base,
            inner.options.reconnect_cap,
        );
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting to gateway"
        );

        tokio::select! {
            _ = inner.shutdown.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match inner.establish(inner.options.reconnect_timeout).await {
            Ok(established) => {
                tracing::info!(attempt, "reconnected to gateway");
                return Some(established);
            }
            Err(CommsError::Auth { reason, code }) => {
                tracing::error!(attempt, %reason, %code, "gateway rejected credentials on reconnect");
                return None;
            }
            Err(CommsError::Closed) => return None,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnect attempt failed");
            }
        }
    }
}

/// Rejoin tracked conversations, restart reading, run the reconnect hook.
async fn resume(inner: &Arc<Inner>, generation: u64, receiver: WsReceiver) {
    let client = Client::from_inner(Arc::clone(inner));

    let tracked: Vec<ConversationId> = inner
        .ack_snapshot()
        .into_iter()
        .map(|(conversation_id, _)| conversation_id)
        .collect();
    if !tracked.is_empty() {
        if let Err(e) = client.join(&tracked).await {
            tracing::warn!(conversations = tracked.len(), error = %e, "resume JOIN failed");
        }
    }

    read_loop::spawn(Arc::clone(inner), generation, receiver);

    let hook = inner.handlers().reconnect_hook();
    if let Some(hook) = hook {
        if let Err(e) = hook(client).await {
            tracing::warn!(error = %e, "reconnect hook failed");
        }
    }
}

/// Start the PRESENCE heartbeat. A zero interval disables it.
pub(crate) fn spawn_heartbeat(inner: Arc<Inner>) {
    let period = inner.options.heartbeat_interval;
    if period.is_zero() {
        tracing::debug!("heartbeat disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !inner.is_connected() {
                continue;
            }

            let presence = PresencePayload {
                status: "online".to_string(),
            };
            let sent = match JsonCodec::encode_bytes(&presence) {
                Ok(payload) => {
                    let frame = Frame::new(FrameType::Presence, ConversationId::nil(), 0, payload);
                    inner.write_frame(&frame).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::debug!(error = %e, "heartbeat not sent");
            }
        }
        tracing::debug!("heartbeat stopped");
    });
}
