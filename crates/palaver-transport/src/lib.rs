//! # Palaver Transport
//!
//! Socket ownership for the Palaver client. The transport owns the wire
//! connection and surfaces its lifecycle as a stream of
//! [`TransportEvent`]s; everything above it (framing, state machine,
//! correlation) is transport-agnostic.
//!
//! Two implementations ship:
//! - [`websocket::WebSocketConnector`] - the production WebSocket client
//! - [`memory::MemoryConnector`] - an in-process pair for tests and the
//!   protocol double
//!
//! Writes are serialized through a single writer task per connection, so
//! frames are never interleaved regardless of caller concurrency.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod websocket;

pub use error::{TransportError, TransportResult};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// WebSocket normal-closure code. Closes carrying this code are explicit
/// shutdowns and must not trigger reconnection.
pub const CLOSE_NORMAL: u16 = 1000;

/// Lifecycle events surfaced by a connection.
///
/// A successful [`Connector::connect`] is itself the "open" signal; the
/// event stream starts after that point.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One complete inbound wire frame.
    Message(Vec<u8>),
    /// The connection closed. `code`/`reason` come from the peer's close
    /// frame when one was received.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason, if the peer sent one.
        reason: Option<String>,
    },
    /// A transport-level error. A `Closed` event follows if the error was
    /// fatal to the connection.
    Error(String),
}

/// An established connection: the write half plus the inbound event
/// stream.
pub struct Connection {
    /// Write half of the connection.
    pub link: Box<dyn Link>,
    /// Inbound lifecycle events. The channel ends when the connection is
    /// gone.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Dials a connection to the service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection.
    ///
    /// Resolving successfully corresponds to the transport-open lifecycle
    /// signal.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connection cannot be
    /// established.
    async fn connect(&self, url: &str) -> TransportResult<Connection>;
}

/// Write half of an established connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Send one complete wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection is gone.
    async fn send(&self, frame: Vec<u8>) -> TransportResult<()>;

    /// Close the connection with a code and reason.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the connection is already
    /// gone.
    async fn close(&self, code: u16, reason: &str) -> TransportResult<()>;

    /// Whether this link has been closed locally.
    fn is_closed(&self) -> bool;
}
