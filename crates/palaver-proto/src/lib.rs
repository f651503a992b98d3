//! # Palaver Proto
//!
//! Wire protocol for the Palaver messaging service web client.
//!
//! This crate provides:
//! - Frame encoding and decoding (magic + kind/version descriptor + payload)
//! - The tagged node tree carried by tagged-binary frames
//! - Typed structured control messages (init, status, pairing, handshake)
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────┬───────────────────────┬─────────────────────────────────┐
//! │ magic    │ kind + version        │ payload                         │
//! │ 2 bytes  │ 4 bytes               │ structured JSON or tagged node  │
//! └──────────┴───────────────────────┴─────────────────────────────────┘
//! ```
//!
//! Two payload kinds exist: *structured* (a self-delimited JSON document,
//! used for control traffic) and *tagged-binary* (a correlation tag followed
//! by a node document, used for request/response traffic).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod messages;
pub mod node;

pub use error::ProtocolError;
pub use frame::{FRAME_HEADER_SIZE, FRAME_MAGIC, Frame, FrameCodec, FrameKind};
pub use messages::{ClientMessage, HandshakeSuccess, ServerMessage, ServerStatus};
pub use node::{Node, NodeContent, decode_tagged, encode_tagged};

/// Protocol version bytes sent in the frame descriptor until the server
/// advertises its own.
pub const PROTOCOL_VERSION: [u8; 3] = [0x01, 0x00, 0x00];
