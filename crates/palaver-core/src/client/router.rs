//! Inbound frame routing and connection-loss handling.
//!
//! The reader task is the single place socket traffic enters the client:
//! structured control documents feed the state machine and auth engine,
//! tagged replies resolve the correlation registry, and closure drives the
//! reconnection policy. Each reader is keyed to the connection epoch it
//! was spawned for and stops as soon as a newer epoch exists.

use super::Client;
use crate::error::{AuthErrorReason, Result};
use crate::events::Event;
use crate::state::ConnectionState;
use palaver_proto::{FrameKind, ServerMessage, ServerStatus};
use palaver_transport::{CLOSE_NORMAL, TransportEvent};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

/// Whether the reader keeps running after a handled message.
pub(crate) enum Flow {
    Continue,
    Stop,
}

impl Client {
    /// Reader task body for one connection epoch.
    pub(crate) async fn read_loop(&self, mut events: mpsc::Receiver<TransportEvent>, epoch: u64) {
        loop {
            let Some(event) = events.recv().await else {
                // Transport vanished without a close frame.
                if self.inner.epoch.load(Ordering::SeqCst) == epoch {
                    self.handle_close(None, None).await;
                }
                return;
            };

            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                // A teardown or reconnect superseded this reader.
                return;
            }

            match event {
                TransportEvent::Message(bytes) => match self.handle_frame(&bytes).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => return,
                    Err(err) => {
                        // A malformed frame is a data condition: log, emit,
                        // keep the connection.
                        tracing::warn!(%err, "dropping undecodable frame");
                        self.inner.events.emit(Event::ConnectionError {
                            message: err.to_string(),
                        });
                    }
                },
                TransportEvent::Closed { code, reason } => {
                    self.handle_close(code, reason).await;
                    return;
                }
                TransportEvent::Error(message) => {
                    tracing::warn!(%message, "transport error");
                    self.inner.events.emit(Event::ConnectionError { message });
                }
            }
        }
    }

    /// Decode one frame and route it by kind.
    pub(crate) async fn handle_frame(&self, bytes: &[u8]) -> Result<Flow> {
        let frame = self.inner.codec.lock().expect("codec lock").decode(bytes)?;
        match frame.kind {
            FrameKind::Structured => {
                let message = ServerMessage::from_payload(&frame.payload)?;
                self.handle_server_message(message).await
            }
            FrameKind::Tagged => {
                let (tag, node) = palaver_proto::decode_tagged(&frame.payload)?;
                self.inner.registry.resolve(&crate::registry::Tag::from(tag), node);
                Ok(Flow::Continue)
            }
        }
    }

    /// Route one classified structured message.
    async fn handle_server_message(&self, message: ServerMessage) -> Result<Flow> {
        match message {
            ServerMessage::Status(ServerStatus::Connected) => {
                match self.transition(ConnectionState::Authenticating) {
                    Ok(()) => self.begin_auth(),
                    Err(err) => tracing::debug!(%err, "ignoring connected status"),
                }
                Ok(Flow::Continue)
            }
            ServerMessage::Status(ServerStatus::Timeout) => {
                tracing::warn!("server reported connection timeout");
                let _ = self.transition(ConnectionState::Timeout);
                Ok(Flow::Continue)
            }
            ServerMessage::Ref { reference, ttl } => {
                self.handle_ref(reference, ttl);
                Ok(Flow::Continue)
            }
            ServerMessage::Success(success) => self.handle_success(success).await,
            ServerMessage::PairCode { code } => {
                self.inner.auth.lock().expect("auth lock").pairing_phone = None;
                self.inner.events.emit(Event::PairingCode { code });
                Ok(Flow::Continue)
            }
            ServerMessage::PairError { reason } => {
                let classified = AuthErrorReason::from_wire(&reason);
                tracing::warn!(?classified, %reason, "pairing request rejected");
                self.inner.auth.lock().expect("auth lock").pairing_phone = None;
                self.inner.events.emit(Event::PairingCodeError { reason });
                Ok(Flow::Continue)
            }
            ServerMessage::Failure { reason } => {
                let reason = reason.unwrap_or_else(|| "handshake rejected".to_owned());
                tracing::error!(%reason, "terminal handshake failure");
                self.inner.events.emit(Event::ConnectionError {
                    message: format!("authentication failed: {reason}"),
                });
                self.teardown(None, Some("authentication failed".to_owned()), false)
                    .await;
                Ok(Flow::Stop)
            }
            ServerMessage::Other(value) => {
                tracing::debug!(document = %value, "unhandled server message");
                Ok(Flow::Continue)
            }
        }
    }

    /// Handle transport closure: tear down, then decide on reconnection.
    pub(crate) async fn handle_close(&self, code: Option<u16>, reason: Option<String>) {
        if self.state() == ConnectionState::Disconnected {
            // Already torn down (explicit disconnect or fatal failure).
            return;
        }

        tracing::info!(?code, ?reason, "transport closed");
        self.teardown(code, reason, false).await;

        let explicit = self.inner.explicit_disconnect.load(Ordering::SeqCst);
        let normal = code == Some(CLOSE_NORMAL);
        if !explicit && !normal && self.inner.config.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    /// Schedule the next reconnection attempt, or give up when the budget
    /// is exhausted.
    pub(crate) fn schedule_reconnect(&self) {
        let delay = {
            let mut reconnect = self.inner.reconnect.lock().expect("reconnect lock");
            reconnect.next_delay(
                self.inner.config.reconnect_delay,
                self.inner.config.max_reconnects,
            )
        };

        let Some(delay) = delay else {
            tracing::warn!("reconnection attempts exhausted");
            self.inner.events.emit(Event::ReconnectFailed);
            return;
        };

        let attempt = self.inner.reconnect.lock().expect("reconnect lock").attempts();
        tracing::info!(attempt, ?delay, "scheduling reconnect");

        let client = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if client.inner.explicit_disconnect.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = client.connect().await {
                tracing::warn!(%err, "reconnect attempt failed");
                client.schedule_reconnect();
            }
        });
        self.inner.timers.lock().expect("timer lock").reconnect = Some(handle.abort_handle());
    }
}
