//! Codec module - payload serialization and compression.
//!
//! - [`JsonCodec`] - every frame payload on this protocol is JSON
//! - [`compression`] - the fast compression pass applied by the frame encoder
//!
//! # Design
//!
//! Codecs are marker structs / free functions with static dispatch, so the
//! frame encoder can pick them without trait objects.
//!
//! # Example
//!
//! ```
//! use neboloop_comms::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

pub mod compression;
mod json;

pub use json::JsonCodec;
