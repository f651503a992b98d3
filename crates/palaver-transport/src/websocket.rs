//! WebSocket transport.
//!
//! Connects with `tokio-tungstenite` and bridges the socket into the
//! [`Connector`]/[`Link`] abstraction. Wire frames travel as binary
//! WebSocket messages; text messages are accepted and treated as frame
//! bytes for tolerance with older gateways. A dedicated writer task owns
//! the sink so concurrent senders never interleave partial frames.

use crate::error::{TransportError, TransportResult};
use crate::{Connection, Connector, Link, TransportEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Event channel depth per connection.
const EVENT_BUFFER: usize = 64;

enum WriterCommand {
    Frame(Vec<u8>),
    Close { code: u16, reason: String },
}

/// WebSocket [`Connector`].
#[derive(Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> TransportResult<Connection> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|err| TransportError::ConnectionFailed(err.to_string()))?;
        tracing::debug!(url, "websocket established");

        let (mut sink, mut stream) = socket.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, mut command_rx) = mpsc::channel::<WriterCommand>(EVENT_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));

        // Writer task: sole owner of the sink.
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    WriterCommand::Frame(bytes) => {
                        if let Err(err) = sink.send(Message::Binary(bytes)).await {
                            tracing::warn!(%err, "websocket send failed");
                            break;
                        }
                    }
                    WriterCommand::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        });

        // Reader task: surfaces inbound traffic and closure.
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Binary(bytes)) => {
                        if event_tx.send(TransportEvent::Message(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        if event_tx
                            .send(TransportEvent::Message(text.into_bytes()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        reader_closed.store(true, Ordering::SeqCst);
                        let (code, reason) = match frame {
                            Some(frame) => {
                                (Some(u16::from(frame.code)), Some(frame.reason.to_string()))
                            }
                            None => (None, None),
                        };
                        let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(err) => {
                        reader_closed.store(true, Ordering::SeqCst);
                        let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                        let _ = event_tx
                            .send(TransportEvent::Closed {
                                code: None,
                                reason: None,
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(Connection {
            link: Box::new(WebSocketLink { command_tx, closed }),
            events: event_rx,
        })
    }
}

struct WebSocketLink {
    command_tx: mpsc::Sender<WriterCommand>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn send(&self, frame: Vec<u8>) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.command_tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self, code: u16, reason: &str) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.command_tx
            .send(WriterCommand::Close {
                code,
                reason: reason.to_owned(),
            })
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
