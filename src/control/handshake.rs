//! CONNECT frame builder and auth reply interpretation.

use crate::codec::JsonCodec;
use crate::config::Config;
use crate::error::{CommsError, Result};
use crate::protocol::messages::{AuthFailPayload, AuthOkPayload, ConnectPayload};
use crate::protocol::{decode_frame, encode_frame, ConversationId, Frame, FrameType};
use crate::transport::{WsReceiver, WsSender};

/// Build the CONNECT frame for a config.
pub fn build_connect_frame(config: &Config) -> Result<Frame> {
    let payload = ConnectPayload {
        bot_id: config.bot_id.clone(),
        credential: config.credential.secret().to_string(),
        device_id: config.device_id.clone(),
    };
    Ok(Frame::new(
        FrameType::Connect,
        ConversationId::nil(),
        0,
        JsonCodec::encode_bytes(&payload)?,
    ))
}

/// Turn the single reply to CONNECT into a session payload or an error.
///
/// # Errors
///
/// `CommsError::Auth` for AUTH_FAIL, `CommsError::Protocol` for any other
/// frame type or for an AUTH_OK that is not `ok` or carries no session id,
/// and codec errors for an unreadable AUTH_OK.
pub fn interpret_auth_reply(reply: &Frame) -> Result<AuthOkPayload> {
    match reply.frame_type {
        FrameType::AuthOk => {
            let ok: AuthOkPayload = JsonCodec::decode(reply.payload())?;
            if !ok.ok || ok.session_id.is_empty() {
                return Err(CommsError::Protocol(format!(
                    "AUTH_OK without a session (ok={}, session_id={:?})",
                    ok.ok, ok.session_id
                )));
            }
            Ok(ok)
        }
        FrameType::AuthFail => {
            // A garbled rejection is still a rejection.
            let fail: AuthFailPayload = JsonCodec::decode(reply.payload()).unwrap_or_default();
            Err(CommsError::Auth {
                reason: fail.reason,
                code: fail.code,
            })
        }
        other => Err(CommsError::Protocol(format!(
            "expected AUTH_OK or AUTH_FAIL, got {other}"
        ))),
    }
}

/// Send CONNECT on a freshly dialed socket and wait for the one reply.
///
/// The caller bounds this with its connect deadline and closes the socket on
/// error.
///
/// # Errors
///
/// Transport errors from the socket, a `Protocol` error if the gateway hangs
/// up without replying, and the errors of [`interpret_auth_reply`].
pub async fn authenticate(
    config: &Config,
    sender: &mut WsSender,
    receiver: &mut WsReceiver,
) -> Result<AuthOkPayload> {
    let connect = build_connect_frame(config)?;
    sender.send_binary(encode_frame(&connect)?).await?;

    let bytes = receiver.recv().await?.ok_or_else(|| {
        CommsError::Protocol("gateway closed the socket before replying to CONNECT".to_string())
    })?;
    let reply = decode_frame(&bytes)?;
    interpret_auth_reply(&reply)
}
