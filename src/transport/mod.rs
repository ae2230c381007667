//! Transport module - bidirectional binary-message socket.
//!
//! The gateway speaks WebSocket; each binary message carries exactly one
//! frame. Dialing returns split halves so the read loop and the writer can
//! own them independently.

mod websocket;

pub use websocket::{dial, normalize_gateway_url, WsReceiver, WsSender};
