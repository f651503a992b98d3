//! Event surface.
//!
//! The client reports everything observable through a single tagged-union
//! [`Event`] delivered to typed subscribers. There are no dynamic event
//! names: subscribers match on the enum.

use crate::session::{Identity, Session};
use crate::state::ConnectionState;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Everything a client instance can report.
#[derive(Debug, Clone)]
pub enum Event {
    /// An applied state-machine transition.
    StateChange {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Transport opened and initialization was sent.
    Connected,
    /// Visual-code payload ready for external rendering.
    Qr {
        /// Server handshake reference.
        reference: String,
        /// Client identifier.
        client_id: String,
        /// Client public key (base64).
        public_key: String,
        /// Seconds until this code expires.
        expires_in_seconds: u64,
    },
    /// The visual code expired; a fresh reference is awaited.
    QrExpired,
    /// Visual-code retries exhausted; the handshake is fatal.
    QrMaxRetries,
    /// A short-code pairing request was sent.
    PairingCodeRequest {
        /// Normalized phone identifier.
        phone: String,
    },
    /// The service delivered a pairing code.
    PairingCode {
        /// Short code to enter on the paired device.
        code: String,
    },
    /// The pairing request was rejected.
    PairingCodeError {
        /// Wire reason (`"missing"` = phone not registered).
        reason: String,
    },
    /// Handshake succeeded and the session was materialized.
    Authenticated {
        /// Authenticated identity.
        user: Identity,
        /// The materialized session record.
        session: Session,
    },
    /// Settle delay elapsed; the connection accepts application traffic.
    Ready,
    /// The connection closed.
    Disconnected {
        /// Close code, if the transport reported one.
        code: Option<u16>,
        /// Close reason, if the transport reported one.
        reason: Option<String>,
    },
    /// A recoverable error: failed dial, undecodable frame, socket error.
    ConnectionError {
        /// Error description.
        message: String,
    },
    /// Reconnection attempts are exhausted.
    ReconnectFailed,
}

/// Typed subscriber list for one client instance.
///
/// Subscribers receive events through unbounded channels; emit never
/// blocks the reader task. Closed receivers are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscriber lock").push(sender);
        receiver
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: Event) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock");
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Number of live subscribers (after the last prune).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock").len()
    }
}
