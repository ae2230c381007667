//! WebSocket implementation over `tokio-tungstenite`.
//!
//! # Example
//!
//! ```ignore
//! use neboloop_comms::transport::dial;
//!
//! let (mut sender, mut receiver) = dial("wss://gateway.example/ws").await?;
//! sender.send_binary(bytes).await?;
//! while let Some(message) = receiver.recv().await? {
//!     // one frame per message
//! }
//! ```

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{CommsError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a gateway connection.
#[derive(Debug)]
pub struct WsSender {
    sink: SplitSink<WsStream, Message>,
}

impl WsSender {
    /// Send one binary message.
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Binary(data.into()))
            .await
            .map_err(|e| CommsError::Transport(format!("websocket send failed: {e}")))
    }

    /// Send a close frame and shut the sink down.
    pub async fn close(&mut self) -> Result<()> {
        // The peer may already be gone; a failed close frame is not interesting.
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| CommsError::Transport(format!("websocket close failed: {e}")))
    }
}

/// Read half of a gateway connection.
#[derive(Debug)]
pub struct WsReceiver {
    stream: SplitStream<WsStream>,
}

impl WsReceiver {
    /// Receive the next binary message.
    ///
    /// Returns `Ok(None)` when the peer closes the connection. Control frames
    /// are handled by tungstenite; stray text frames are skipped.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Close(close_frame))) => {
                    if let Some(cf) = close_frame {
                        tracing::debug!(code = u16::from(cf.code), reason = %cf.reason.as_str(), "gateway closed socket");
                    }
                    return Ok(None);
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(len = text.len(), "ignoring text message from gateway");
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(CommsError::Transport(format!("websocket read failed: {e}")))
                }
                None => return Ok(None),
            }
        }
    }
}

/// Dial the gateway and split the socket.
///
/// # Errors
///
/// Returns `CommsError::Transport` if the URL is invalid or the WebSocket
/// handshake fails.
pub async fn dial(url: &str) -> Result<(WsSender, WsReceiver)> {
    let url = normalize_gateway_url(url);
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| CommsError::Transport(format!("dial {url} failed: {e}")))?;

    let (sink, stream) = ws_stream.split();
    Ok((WsSender { sink }, WsReceiver { stream }))
}

/// Convert an HTTP(S) gateway address to the WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
pub fn normalize_gateway_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
