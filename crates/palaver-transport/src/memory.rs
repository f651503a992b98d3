//! In-memory transport for tests and the protocol double.
//!
//! [`memory_pair`] yields a [`MemoryConnector`] to hand to the client and a
//! [`MemoryListener`] the test accepts connections from. Each accepted
//! [`MemoryPeer`] is the server half of one connection: it reads the
//! client's outbound frames and injects inbound frames or closure.

use crate::error::{TransportError, TransportResult};
use crate::{Connection, Connector, Link, TransportEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Event channel depth per connection.
const EVENT_BUFFER: usize = 64;

/// Create a connector/listener pair.
///
/// Every `connect` call on the connector produces a fresh connection whose
/// server half pops out of the listener, so reconnects are observable as
/// additional accepts.
#[must_use]
pub fn memory_pair() -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { accept_tx },
        MemoryListener { accept_rx },
    )
}

/// In-memory [`Connector`].
#[derive(Debug)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &str) -> TransportResult<Connection> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let peer = MemoryPeer {
            outbound_rx,
            event_tx,
            closed: Arc::clone(&closed),
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".into()))?;

        Ok(Connection {
            link: Box::new(MemoryLink {
                outbound_tx: Mutex::new(Some(outbound_tx)),
                closed,
            }),
            events: event_rx,
        })
    }
}

/// Accept side of [`memory_pair`].
#[derive(Debug)]
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection from the client.
    ///
    /// Returns `None` once the connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

/// Server half of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: mpsc::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Receive the next frame the client sent.
    ///
    /// Returns `None` once the client's link is closed or dropped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.outbound_rx.recv().await
    }

    /// Inject an inbound frame toward the client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the client side is gone.
    pub async fn send(&self, frame: Vec<u8>) -> TransportResult<()> {
        self.event_tx
            .send(TransportEvent::Message(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Close the connection from the server side.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the client side is gone.
    pub async fn close(&self, code: u16, reason: &str) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.event_tx
            .send(TransportEvent::Closed {
                code: Some(code),
                reason: Some(reason.to_owned()),
            })
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Inject a transport error toward the client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the client side is gone.
    pub async fn inject_error(&self, message: &str) -> TransportResult<()> {
        self.event_tx
            .send(TransportEvent::Error(message.to_owned()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Whether the client closed its half.
    #[must_use]
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemoryLink {
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&self, frame: Vec<u8>) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let sender = self
            .outbound_tx
            .lock()
            .expect("outbound lock")
            .clone();
        match sender {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&self, _code: u16, _reason: &str) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender ends the peer's recv stream.
        self.outbound_tx.lock().expect("outbound lock").take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
