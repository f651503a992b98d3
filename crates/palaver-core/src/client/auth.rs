//! Authentication engine.
//!
//! Both handshake variants share one pattern: generate key material if
//! absent, exchange handshake messages, interpret the reply into a
//! session. The visual-code variant loops on server-pushed references with
//! an expiry timer and a bounded retry counter; the short-code variant
//! sends exactly one request and leaves retries to the caller.

use super::Client;
use super::router::Flow;
use crate::config::AuthMethod;
use crate::error::{AuthErrorReason, ClientError, Result};
use crate::events::Event;
use crate::session::{Identity, Session};
use crate::state::ConnectionState;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use palaver_crypto::{CryptoError, random, unwrap_secret};
use palaver_proto::{ClientMessage, HandshakeSuccess};
use std::borrow::Cow;
use std::sync::atomic::Ordering;
use std::time::Duration;

impl Client {
    /// Enter the handshake after the server accepts the connection.
    pub(crate) fn begin_auth(&self) {
        let has_session = self.inner.session.lock().expect("session lock").is_some();
        if !has_session {
            self.inner.auth.lock().expect("auth lock").ensure_material();
        }
        match self.inner.config.auth_method {
            AuthMethod::VisualCode => tracing::debug!("awaiting visual-code reference"),
            AuthMethod::ShortCode => tracing::debug!("awaiting pairing request from caller"),
        }
    }

    /// Request a pairing code for `phone` (short-code variant).
    ///
    /// Sends exactly one structured request with a fresh reference. The
    /// outcome arrives as a [`Event::PairingCode`] or
    /// [`Event::PairingCodeError`]; there is no automatic retry.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] if short-code auth is not configured
    /// or no handshake is in progress, and [`ClientError::Auth`] for a
    /// phone without digits.
    pub async fn request_pairing_code(&self, phone: &str) -> Result<()> {
        if self.inner.config.auth_method != AuthMethod::ShortCode {
            return Err(ClientError::state("short-code authentication not configured"));
        }
        let state = self.state();
        if state != ConnectionState::Authenticating {
            return Err(ClientError::State(Cow::Owned(format!(
                "pairing request requires a handshake in progress, state is {state:?}"
            ))));
        }

        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(ClientError::auth(
                AuthErrorReason::Unknown,
                "phone identifier has no digits",
            ));
        }

        let (reference, public_key) = {
            let mut auth = self.inner.auth.lock().expect("auth lock");
            let public_key = auth.ensure_material().keys.public_base64();
            let reference = BASE64.encode(random::random_16()?);
            auth.pairing_phone = Some(digits.clone());
            (reference, public_key)
        };

        self.send_client_message(&ClientMessage::PairRequest {
            reference,
            public_key,
            phone: digits.clone(),
        })
        .await?;

        tracing::info!(phone = %digits, "pairing code requested");
        self.inner.events.emit(Event::PairingCodeRequest { phone: digits });
        Ok(())
    }

    /// Handle a visual-code reference push.
    pub(crate) fn handle_ref(&self, reference: String, ttl: Option<u64>) {
        if self.state() != ConnectionState::Authenticating {
            tracing::debug!("ignoring reference outside an active handshake");
            return;
        }
        if self.inner.config.auth_method != AuthMethod::VisualCode {
            tracing::debug!("ignoring reference: short-code authentication configured");
            return;
        }

        let (client_id, public_key) = {
            let mut auth = self.inner.auth.lock().expect("auth lock");
            let material = auth.ensure_material();
            (material.client_id.clone(), material.keys.public_base64())
        };

        let lifetime = ttl
            .map(Duration::from_millis)
            .unwrap_or(self.inner.config.qr_timeout);
        tracing::debug!(expires_in = ?lifetime, "visual-code reference received");

        self.inner.events.emit(Event::Qr {
            reference,
            client_id,
            public_key,
            expires_in_seconds: lifetime.as_secs(),
        });
        self.start_qr_timer(lifetime);
    }

    /// (Re)arm the code-expiry timer for the current reference.
    fn start_qr_timer(&self, lifetime: Duration) {
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        if let Some(previous) = self.inner.timers.lock().expect("timer lock").qr.take() {
            previous.abort();
        }

        let client = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            client.on_qr_expired(epoch).await;
        });
        self.inner.timers.lock().expect("timer lock").qr = Some(handle.abort_handle());
    }

    /// Code-expiry timer fired.
    pub(crate) async fn on_qr_expired(&self, epoch: u64) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        if self.state() != ConnectionState::Authenticating {
            return;
        }

        let exhausted = {
            let mut auth = self.inner.auth.lock().expect("auth lock");
            auth.qr_retries += 1;
            auth.qr_retries >= self.inner.config.qr_max_retries
        };

        if exhausted {
            tracing::warn!("visual-code retries exhausted");
            self.inner.events.emit(Event::QrMaxRetries);
            // Runs on the timer task, so aborting the reader is safe here.
            self.teardown(None, Some("visual-code retries exhausted".to_owned()), true)
                .await;
        } else {
            tracing::info!("visual code expired, awaiting fresh reference");
            self.inner.events.emit(Event::QrExpired);
        }
    }

    /// Handle a handshake-success message: materialize the session and
    /// schedule the settle into `Ready`.
    pub(crate) async fn handle_success(&self, success: HandshakeSuccess) -> Result<Flow> {
        let state = self.state();
        if !matches!(
            state,
            ConnectionState::Connected | ConnectionState::Authenticating
        ) {
            tracing::debug!(?state, "ignoring handshake success");
            return Ok(Flow::Continue);
        }

        if let Some(timer) = self.inner.timers.lock().expect("timer lock").qr.take() {
            timer.abort();
        }

        let session = match self.materialize_session(&success) {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(%err, "session materialization failed");
                self.inner.events.emit(Event::ConnectionError {
                    message: err.to_string(),
                });
                self.teardown(None, Some("session materialization failed".to_owned()), false)
                    .await;
                return Ok(Flow::Stop);
            }
        };

        *self.inner.session.lock().expect("session lock") = Some(session.clone());
        self.transition(ConnectionState::Authenticated)?;
        {
            let mut auth = self.inner.auth.lock().expect("auth lock");
            auth.qr_retries = 0;
            auth.pairing_phone = None;
        }

        tracing::info!(user = %session.identity.id, "authenticated");
        self.inner.events.emit(Event::Authenticated {
            user: session.identity.clone(),
            session,
        });

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.schedule_settle(epoch);
        Ok(Flow::Continue)
    }

    /// Build the session record from a success message plus locally held
    /// key material.
    fn materialize_session(&self, success: &HandshakeSuccess) -> Result<Session> {
        let existing = self.inner.session.lock().expect("session lock").clone();
        let mut auth = self.inner.auth.lock().expect("auth lock");

        let client_id = if let Some(material) = &auth.material {
            material.client_id.clone()
        } else if let Some(session) = &existing {
            session.client_id.clone()
        } else {
            auth.ensure_material().client_id.clone()
        };

        let key_material = match &success.secret {
            Some(secret) => {
                let material = auth.material.as_ref().ok_or(ClientError::auth(
                    AuthErrorReason::Unknown,
                    "secret delivered without handshake key material",
                ))?;
                let blob = BASE64
                    .decode(secret)
                    .map_err(|_| ClientError::Crypto(CryptoError::BadEncoding))?;
                Some(unwrap_secret(&material.keys, &blob)?)
            }
            None => existing.and_then(|session| session.key_material),
        };

        // The handshake key pair folds into the session here; nothing else
        // may observe it afterwards.
        auth.material = None;

        Ok(Session {
            client_id,
            server_token: success.session.clone(),
            client_token: success.client_token.clone(),
            key_material,
            identity: Identity {
                id: success.wid.clone(),
                name: success.pushname.clone(),
                phone: success.phone.clone(),
            },
        })
    }

    /// Delay the `Authenticated -> Ready` transition by the settle delay,
    /// unless the state moves away in the meantime.
    pub(crate) fn schedule_settle(&self, epoch: u64) {
        if let Some(previous) = self.inner.timers.lock().expect("timer lock").settle.take() {
            previous.abort();
        }

        let client = self.clone();
        let delay = self.inner.config.ready_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if client.inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            if client.state() != ConnectionState::Authenticated {
                return;
            }
            if client.transition(ConnectionState::Ready).is_ok() {
                client.inner.reconnect.lock().expect("reconnect lock").reset();
                client.inner.auth.lock().expect("auth lock").qr_retries = 0;
                tracing::info!("connection ready");
                client.inner.events.emit(Event::Ready);
            }
        });
        self.inner.timers.lock().expect("timer lock").settle = Some(handle.abort_handle());
    }
}
