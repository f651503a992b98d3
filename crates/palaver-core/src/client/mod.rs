//! Client composition root.
//!
//! One [`Client`] owns one logical connection: the transport link, frame
//! codec, state machine, tag registry, auth context, and every timer tied
//! to the current connection epoch. Components never hold a back-reference
//! to the client; notifications flow through the injected state observer
//! and the event bus.
//!
//! The handle is cheaply cloneable (`Arc` inner), so background tasks and
//! API callers share one instance.

mod auth;
mod router;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{Event, EventBus};
use crate::reconnect::ReconnectState;
use crate::registry::TagRegistry;
use crate::session::Session;
use crate::state::{ConnectionState, StateMachine};
use palaver_crypto::KeyMaterial;
use palaver_proto::{ClientMessage, FrameCodec, FrameKind, Node};
use palaver_transport::websocket::WebSocketConnector;
use palaver_transport::{CLOSE_NORMAL, Connector, Link};
use rand_core::OsRng;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

/// Handshake state for one connection attempt. Cleared completely on
/// disconnect.
pub(crate) struct AuthContext {
    /// Key material for the in-flight handshake, if any.
    pub(crate) material: Option<KeyMaterial>,
    /// Visual-code expirations seen this attempt.
    pub(crate) qr_retries: u32,
    /// Phone with a pairing request in flight.
    pub(crate) pairing_phone: Option<String>,
}

impl AuthContext {
    fn new() -> Self {
        Self {
            material: None,
            qr_retries: 0,
            pairing_phone: None,
        }
    }

    /// Key material for the current handshake attempt, generating it on
    /// first use.
    pub(crate) fn ensure_material(&mut self) -> &KeyMaterial {
        if self.material.is_none() {
            self.material = Some(KeyMaterial::generate(&mut OsRng));
        }
        self.material.as_ref().expect("material just ensured")
    }
}

/// Scoped timers tied to the current connection epoch.
#[derive(Default)]
pub(crate) struct Timers {
    pub(crate) qr: Option<AbortHandle>,
    pub(crate) settle: Option<AbortHandle>,
    pub(crate) reconnect: Option<AbortHandle>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Box<dyn Connector>,
    pub(crate) state: Mutex<StateMachine>,
    pub(crate) registry: TagRegistry,
    pub(crate) events: EventBus,
    pub(crate) codec: Mutex<FrameCodec>,
    pub(crate) link: tokio::sync::Mutex<Option<Box<dyn Link>>>,
    pub(crate) session: Mutex<Option<Session>>,
    pub(crate) auth: Mutex<AuthContext>,
    pub(crate) reconnect: Mutex<ReconnectState>,
    pub(crate) timers: Mutex<Timers>,
    pub(crate) reader: Mutex<Option<JoinHandle<()>>>,
    pub(crate) epoch: AtomicU64,
    pub(crate) explicit_disconnect: AtomicBool,
}

/// Palaver protocol client.
///
/// Maintains at most one logical connection to the service at a time and
/// exposes the tagged/structured send primitives that higher-level
/// builders use.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl Client {
    /// Create a client using the WebSocket transport.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Box::new(WebSocketConnector::new()))
    }

    /// Create a client over a custom transport connector.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Box<dyn Connector>) -> Self {
        let events = EventBus::new();
        let observer = events.clone();
        let state = StateMachine::with_observer(move |from, to| {
            observer.emit(Event::StateChange { from, to });
        });

        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                state: Mutex::new(state),
                registry: TagRegistry::new(),
                events,
                codec: Mutex::new(FrameCodec::new()),
                link: tokio::sync::Mutex::new(None),
                session: Mutex::new(None),
                auth: Mutex::new(AuthContext::new()),
                reconnect: Mutex::new(ReconnectState::new()),
                timers: Mutex::new(Timers::default()),
                reader: Mutex::new(None),
                epoch: AtomicU64::new(0),
                explicit_disconnect: AtomicBool::new(false),
            }),
        }
    }

    /// Install a previously persisted session record.
    ///
    /// The next [`Client::connect`] sends a resume initialization instead
    /// of starting a handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] unless the client is disconnected.
    pub fn restore_session(&self, session: Session) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            return Err(ClientError::state("session restore requires a disconnected client"));
        }
        *self.inner.session.lock().expect("session lock") = Some(session);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Accessors
// ═══════════════════════════════════════════════════════════════════════════

impl Client {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().expect("state lock").state()
    }

    /// Current session record, if authenticated (or restored).
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.session.lock().expect("session lock").clone()
    }

    /// Subscribe to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        self.inner.events.subscribe()
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Number of tagged requests currently awaiting replies.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.pending_len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

impl Client {
    /// Establish a connection and send the initialization message.
    ///
    /// Returns once the transport is open and initialization is on the
    /// wire; authentication continues in the background and is observable
    /// through the event stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] if a connection is already in
    /// progress, or the transport error if the dial fails.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().expect("state lock");
            match state.state() {
                ConnectionState::Disconnected => {}
                ConnectionState::Timeout => {
                    state.transition_to(ConnectionState::Disconnected)?;
                }
                other => {
                    return Err(ClientError::State(Cow::Owned(format!(
                        "connect while {other:?}"
                    ))));
                }
            }
        }

        self.inner.explicit_disconnect.store(false, Ordering::SeqCst);
        self.transition(ConnectionState::Connecting)?;
        tracing::info!(endpoint = %self.inner.config.endpoint, "connecting");

        let connection = match self.inner.connector.connect(&self.inner.config.endpoint).await {
            Ok(connection) => connection,
            Err(err) => {
                let _ = self.transition(ConnectionState::Disconnected);
                self.inner.events.emit(Event::ConnectionError {
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.codec.lock().expect("codec lock") = FrameCodec::new();
        *self.inner.link.lock().await = Some(connection.link);
        self.transition(ConnectionState::Connected)?;
        self.inner.events.emit(Event::Connected);

        if let Err(err) = self.send_init().await {
            self.inner.events.emit(Event::ConnectionError {
                message: err.to_string(),
            });
            self.teardown(None, Some("initialization send failed".to_owned()), false)
                .await;
            return Err(err);
        }

        let client = self.clone();
        let events = connection.events;
        let handle = tokio::spawn(async move { client.read_loop(events, epoch).await });
        let previous = self.inner.reader.lock().expect("reader lock").replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Explicitly disconnect.
    ///
    /// Cancels every timer, rejects every pending tagged request, closes
    /// the transport with a normal code, and suppresses reconnection.
    pub async fn disconnect(&self) {
        self.inner.explicit_disconnect.store(true, Ordering::SeqCst);
        self.teardown(
            Some(CLOSE_NORMAL),
            Some("client disconnect".to_owned()),
            true,
        )
        .await;
    }

    /// Log out: invalidate the session and disconnect.
    ///
    /// Unlike [`Client::disconnect`], the session record is cleared, so a
    /// later connect starts a fresh handshake.
    pub async fn logout(&self) {
        if matches!(
            self.state(),
            ConnectionState::Authenticated | ConnectionState::Ready
        ) {
            if let Err(err) = self.send_client_message(&ClientMessage::Logout).await {
                tracing::warn!(%err, "logout notification failed");
            }
        }

        self.inner.session.lock().expect("session lock").take();
        {
            let mut auth = self.inner.auth.lock().expect("auth lock");
            auth.material = None;
            auth.qr_retries = 0;
            auth.pairing_phone = None;
        }
        self.disconnect().await;
    }

    /// Send the initialization message for the current connection.
    pub(crate) async fn send_init(&self) -> Result<()> {
        let session = self.inner.session.lock().expect("session lock").clone();
        let message = match &session {
            Some(session) => ClientMessage::Init {
                client_id: session.client_id.clone(),
                version: self.inner.config.version.clone(),
                resume: true,
                server_token: Some(session.server_token.clone()),
                client_token: Some(session.client_token.clone()),
            },
            None => ClientMessage::Init {
                client_id: self
                    .inner
                    .auth
                    .lock()
                    .expect("auth lock")
                    .ensure_material()
                    .client_id
                    .clone(),
                version: self.inner.config.version.clone(),
                resume: false,
                server_token: None,
                client_token: None,
            },
        };
        self.send_client_message(&message).await
    }

    /// Tear down the current connection: cancel timers, reject pending
    /// requests, release the transport, and transition to `Disconnected`.
    ///
    /// `abort_reader` must be false when called from within the reader
    /// task itself (the reader stops on its own).
    pub(crate) async fn teardown(
        &self,
        code: Option<u16>,
        reason: Option<String>,
        abort_reader: bool,
    ) {
        self.cancel_timers();
        self.inner.registry.reject_all("connection torn down");
        // Orphan every task still keyed to the old epoch.
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        if abort_reader {
            let handle = self.inner.reader.lock().expect("reader lock").take();
            if let Some(handle) = handle {
                handle.abort();
            }
        }

        if let Some(link) = self.inner.link.lock().await.take() {
            let _ = link
                .close(
                    code.unwrap_or(CLOSE_NORMAL),
                    reason.as_deref().unwrap_or(""),
                )
                .await;
        }

        let already_disconnected =
            self.inner.state.lock().expect("state lock").state() == ConnectionState::Disconnected;
        if !already_disconnected {
            let _ = self.transition(ConnectionState::Disconnected);
            self.inner.events.emit(Event::Disconnected { code, reason });
        }
    }

    /// Abort every outstanding timer.
    pub(crate) fn cancel_timers(&self) {
        let mut timers = self.inner.timers.lock().expect("timer lock");
        for handle in [
            timers.qr.take(),
            timers.settle.take(),
            timers.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Send primitives
// ═══════════════════════════════════════════════════════════════════════════

impl Client {
    /// Send a structured document.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] unless the connection is
    /// `Authenticated` or `Ready`.
    pub async fn send_structured(&self, document: serde_json::Value) -> Result<()> {
        self.ensure_sendable()?;
        self.send_frame(FrameKind::Structured, &serde_json::to_vec(&document)?)
            .await
    }

    /// Send a tagged request and await its reply with the configured
    /// default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] unless the connection is
    /// `Authenticated` or `Ready`, [`ClientError::Timeout`] if the reply
    /// misses the deadline, or the transport error if the send fails.
    pub async fn send_tagged(&self, node: Node) -> Result<Node> {
        self.send_tagged_with_timeout(node, self.inner.config.request_timeout)
            .await
    }

    /// Send a tagged request with an explicit per-call deadline.
    ///
    /// # Errors
    ///
    /// As [`Client::send_tagged`].
    pub async fn send_tagged_with_timeout(&self, node: Node, deadline: Duration) -> Result<Node> {
        self.ensure_sendable()?;

        let tag = self.inner.registry.next_tag();
        let payload = palaver_proto::encode_tagged(tag.as_str(), &node)?;
        let reply = self.inner.registry.register(&tag, deadline);

        if let Err(err) = self.send_frame(FrameKind::Tagged, &payload).await {
            self.inner.registry.discard(&tag);
            return Err(err);
        }
        reply.await
    }

    /// Encode and write one frame through the current link.
    pub(crate) async fn send_frame(&self, kind: FrameKind, payload: &[u8]) -> Result<()> {
        let wire = self.inner.codec.lock().expect("codec lock").encode(kind, payload);
        let link = self.inner.link.lock().await;
        match link.as_ref() {
            Some(link) => Ok(link.send(wire).await?),
            None => Err(ClientError::transport("no active transport link")),
        }
    }

    /// Serialize and send a control message.
    pub(crate) async fn send_client_message(&self, message: &ClientMessage) -> Result<()> {
        self.send_frame(FrameKind::Structured, &message.to_payload()?)
            .await
    }

    /// Apply a state transition through the shared machine.
    pub(crate) fn transition(&self, to: ConnectionState) -> Result<()> {
        self.inner.state.lock().expect("state lock").transition_to(to)
    }

    /// Guard for connect-only operations.
    pub(crate) fn ensure_sendable(&self) -> Result<()> {
        let state = self.state();
        if matches!(
            state,
            ConnectionState::Authenticated | ConnectionState::Ready
        ) {
            Ok(())
        } else {
            Err(ClientError::State(Cow::Owned(format!(
                "send requires an authenticated connection, state is {state:?}"
            ))))
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending_requests", &self.pending_requests())
            .finish_non_exhaustive()
    }
}
