//! Connection state machine.
//!
//! One state machine per client instance owns the canonical connection
//! state. Every transition is validated against a fixed table; illegal
//! transitions are rejected, never silently applied. Components that need
//! to observe transitions receive them through an injected callback
//! rather than a back-reference to the client.

use crate::error::ClientError;
use std::borrow::Cow;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection. Initial state, and terminal for a failed attempt.
    Disconnected,
    /// Transport dial in progress.
    Connecting,
    /// Transport open; initialization sent.
    Connected,
    /// Server accepted the connection; handshake in progress.
    Authenticating,
    /// Handshake succeeded; session materialized.
    Authenticated,
    /// Settle delay elapsed; ready for application traffic.
    Ready,
    /// Server reported a connection timeout.
    Timeout,
}

type Observer = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Validating state machine with transition notifications.
pub struct StateMachine {
    state: ConnectionState,
    observer: Option<Observer>,
}

impl StateMachine {
    /// Create a state machine in `Disconnected` with no observer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            observer: None,
        }
    }

    /// Create a state machine that reports every applied transition.
    #[must_use]
    pub fn with_observer(
        observer: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            observer: Some(Box::new(observer)),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check whether a transition is allowed by the table.
    #[must_use]
    pub fn can_transition(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self.state, to) {
            // Forward chain of a connection attempt.
            (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connected, Authenticating)
            | (Authenticating, Authenticated)
            | (Authenticated, Ready) => true,

            // Session resume skips the handshake.
            (Connected, Authenticated) => true,

            // Any state may time out or fall back to disconnected.
            (_, Timeout) | (_, Disconnected) => true,

            _ => false,
        }
    }

    /// Apply a transition.
    ///
    /// A same-state transition is a no-op and emits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::State`] if the table forbids the transition;
    /// the current state is left unchanged.
    pub fn transition_to(&mut self, to: ConnectionState) -> Result<(), ClientError> {
        if self.state == to {
            return Ok(());
        }
        if !self.can_transition(to) {
            return Err(ClientError::State(Cow::Owned(format!(
                "illegal transition {:?} -> {to:?}",
                self.state
            ))));
        }

        let from = std::mem::replace(&mut self.state, to);
        tracing::debug!(?from, ?to, "connection state transition");
        if let Some(observer) = &self.observer {
            observer(from, to);
        }
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
