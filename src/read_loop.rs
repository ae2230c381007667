//! Per-generation read loop and frame dispatch.
//!
//! One loop runs per connection generation. It reads a frame, handles it to
//! completion (including awaiting the delivery handler), then reads the
//! next. Handlers therefore run one at a time, in arrival order, on this
//! loop.
//!
//! Deliveries are acknowledged on receipt, before the handler runs and
//! whether or not a handler exists. Delivery is at-least-once; a handler
//! that fails does not cause a redelivery.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::client::Client;
use crate::codec::JsonCodec;
use crate::connection::Inner;
use crate::error::CommsError;
use crate::handler::Delivery;
use crate::protocol::messages::{AckPayload, ReplayPayload, SlowDownPayload};
use crate::protocol::{decode_frame, Frame, FrameType};
use crate::transport::WsReceiver;

/// Start the read loop for `generation`.
pub(crate) fn spawn(inner: Arc<Inner>, generation: u64, receiver: WsReceiver) -> JoinHandle<()> {
    tokio::spawn(run(inner, generation, receiver))
}

async fn run(inner: Arc<Inner>, generation: u64, mut receiver: WsReceiver) {
    let shutdown = inner.shutdown.clone();
    tracing::debug!(generation, "read loop started");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(generation, "read loop stopped by close");
                return;
            }
            next = receiver.recv() => next,
        };

        let bytes = match next {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                let reason = CommsError::Transport("gateway closed the connection".to_string());
                inner.connection_lost(generation, &reason);
                return;
            }
            Err(e) => {
                inner.connection_lost(generation, &e);
                return;
            }
        };

        if !inner.is_current(generation) {
            tracing::debug!(generation, "read loop superseded, exiting");
            return;
        }

        match decode_frame(&bytes) {
            Ok(frame) => dispatch(&inner, frame).await,
            Err(e) => {
                tracing::warn!(generation, error = %e, len = bytes.len(), "dropping undecodable frame");
            }
        }
    }
}

/// Route one inbound frame.
async fn dispatch(inner: &Arc<Inner>, frame: Frame) {
    tracing::debug!(
        frame_type = %frame.frame_type,
        conversation_id = %frame.conversation_id,
        seq = frame.seq,
        len = frame.payload_len(),
        "frame received"
    );

    match frame.frame_type {
        FrameType::MessageDelivery => {
            handle_delivery(inner, frame).await;
            return;
        }
        FrameType::SlowDown => {
            let hint: SlowDownPayload = JsonCodec::decode(frame.payload()).unwrap_or_default();
            tracing::warn!(
                reason = hint.reason.as_deref().unwrap_or(""),
                retry_after_ms = hint.retry_after_ms,
                "gateway asked us to slow down"
            );
        }
        FrameType::Replay => match JsonCodec::decode::<ReplayPayload>(frame.payload()) {
            Ok(replay) => {
                for gap in &replay.gaps {
                    tracing::warn!(
                        conversation_id = %gap.conversation_id,
                        last_seq = gap.last_seq,
                        current_seq = gap.current_seq,
                        gap_size = gap.gap_size,
                        "gateway reported a delivery gap"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "unreadable REPLAY payload"),
        },
        FrameType::Ack | FrameType::Presence | FrameType::Typing => {}
        FrameType::Close => {
            tracing::info!(payload_len = frame.payload_len(), "gateway sent CLOSE");
        }
        other => {
            tracing::debug!(frame_type = %other, "ignoring frame");
        }
    }

    let hook = inner.handlers().frame_hook(frame.frame_type);
    if let Some(hook) = hook {
        let frame_type = frame.frame_type;
        if let Err(e) = hook(frame, Client::from_inner(Arc::clone(inner))).await {
            tracing::warn!(frame_type = %frame_type, error = %e, "frame hook failed");
        }
    }
}

async fn handle_delivery(inner: &Arc<Inner>, frame: Frame) {
    let conversation_id = frame.conversation_id;
    let seq = frame.seq;

    let tracked = inner.record_ack(conversation_id, seq);
    let ack = AckPayload {
        conversation_id: Some(conversation_id.to_hex()),
        acked_seq: seq,
    };
    match JsonCodec::encode_bytes(&ack) {
        Ok(payload) => {
            let frame = Frame::new(FrameType::Ack, conversation_id, seq, payload);
            if let Err(e) = inner.write_frame(&frame).await {
                tracing::warn!(%conversation_id, seq, error = %e, "failed to send ACK");
            }
        }
        Err(e) => tracing::warn!(%conversation_id, seq, error = %e, "failed to encode ACK"),
    }
    tracing::debug!(%conversation_id, seq, tracked, "delivery acknowledged");

    let delivery = match Delivery::from_frame(&frame) {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::warn!(%conversation_id, seq, error = %e, "dropping malformed delivery");
            return;
        }
    };

    let handler = inner.handlers().get_handler(&delivery.content_type);
    let Some(handler) = handler else {
        tracing::warn!(
            %conversation_id,
            seq,
            content_type = %delivery.content_type,
            "no handler registered, dropping delivery"
        );
        return;
    };

    let content_type = delivery.content_type.clone();
    if let Err(e) = handler
        .call(delivery, Client::from_inner(Arc::clone(inner)))
        .await
    {
        tracing::warn!(%conversation_id, seq, %content_type, error = %e, "handler failed");
    }
}
