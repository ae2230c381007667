//! Control module - the CONNECT / AUTH handshake.
//!
//! Every connection generation starts the same way: dial, present the bot
//! identity in a CONNECT frame, then wait for exactly one reply.
//!
//! # Workflow
//!
//! 1. Dial the gateway
//! 2. Send CONNECT `{bot_id, credential, device_id?}`
//! 3. Read one frame
//! 4. AUTH_OK: keep the socket and the session id
//! 5. AUTH_FAIL or anything else: close the socket and return the error
//!
//! # Example
//!
//! ```ignore
//! use neboloop_comms::control::authenticate;
//! use neboloop_comms::transport::dial;
//!
//! let (mut sender, mut receiver) = dial(&config.gateway_url).await?;
//! let auth = authenticate(&config, &mut sender, &mut receiver).await?;
//! println!("session {}", auth.session_id);
//! ```

mod handshake;

pub use handshake::{authenticate, build_connect_frame, interpret_auth_reply};
