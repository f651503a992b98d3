//! # Palaver Core
//!
//! Session/transport layer for the Palaver messaging service web
//! protocol. This crate owns the connection lifecycle; content builders
//! and storage live elsewhere and drive it through [`Client`]'s send
//! primitives and event stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │  (composition root: one logical connection per instance)     │
//! ├──────────────┬───────────────┬───────────────┬───────────────┤
//! │ State        │ Tag           │ Auth engine   │ Reconnection  │
//! │ machine      │ registry      │ (QR / code)   │ policy        │
//! ├──────────────┴───────────────┴───────────────┴───────────────┤
//! │                    Frame codec (palaver-proto)               │
//! ├──────────────────────────────────────────────────────────────┤
//! │                    Transport (palaver-transport)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound frames are classified by kind: structured control documents
//! feed the state machine and auth engine; tagged replies resolve the
//! correlation registry. All state mutation is confined to the client's
//! reader task plus short per-field locks, so socket callbacks never race
//! the API surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod state;

pub use client::Client;
pub use config::{AuthMethod, ClientConfig};
pub use error::{AuthErrorReason, ClientError, Result};
pub use events::Event;
pub use registry::{Tag, TagRegistry};
pub use session::{Identity, Session};
pub use state::ConnectionState;
