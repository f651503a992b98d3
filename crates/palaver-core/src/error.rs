//! Error types for the client API.
//!
//! The taxonomy mirrors where a failure belongs, which in turn decides how
//! it propagates: transport failures feed the reconnection policy, per-
//! frame protocol errors are logged and emitted without tearing anything
//! down, tagged-request timeouts surface only to the awaiting caller, and
//! terminal auth failures force a full disconnect.

use palaver_crypto::CryptoError;
use palaver_proto::ProtocolError;
use palaver_transport::TransportError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure or closure.
    #[error("transport error: {0}")]
    Transport(Cow<'static, str>),

    /// Malformed frame or unknown payload kind.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cryptographic failure during the handshake.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Handshake rejected.
    #[error("authentication failed ({reason:?}): {message}")]
    Auth {
        /// Classified rejection reason.
        reason: AuthErrorReason,
        /// Human-readable context.
        message: Cow<'static, str>,
    },

    /// A tagged request or handshake step exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// Operation invoked while the connection is in a state that does not
    /// permit it.
    #[error("invalid state: {0}")]
    State(Cow<'static, str>),

    /// Document serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Returns true if this error is transient and the operation may
    /// succeed on retry over a fresh connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_))
    }

    /// Returns true if this error is permanent and needs caller
    /// intervention.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ClientError::Auth { .. }
                | ClientError::State(_)
                | ClientError::Crypto(_)
                | ClientError::Serialization(_)
        )
    }

    /// Create a transport error with static context (zero allocation).
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        ClientError::Transport(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation).
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        ClientError::Timeout(Cow::Borrowed(context))
    }

    /// Create an invalid-state error with static context (zero allocation).
    #[must_use]
    pub const fn state(context: &'static str) -> Self {
        ClientError::State(Cow::Borrowed(context))
    }

    /// Create an auth error with static context (zero allocation).
    #[must_use]
    pub const fn auth(reason: AuthErrorReason, context: &'static str) -> Self {
        ClientError::Auth {
            reason,
            message: Cow::Borrowed(context),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transport(Cow::Owned(err.to_string()))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

/// Classified handshake-rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorReason {
    /// Phone identifier not registered with the service.
    Missing,
    /// Server throttled the attempt.
    RateLimited,
    /// Anything else.
    Unknown,
}

impl AuthErrorReason {
    /// Classify a wire reason string.
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "missing" => AuthErrorReason::Missing,
            "rate_limited" | "rate-limited" | "429" => AuthErrorReason::RateLimited,
            _ => AuthErrorReason::Unknown,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::transport("reset").is_transient());
        assert!(ClientError::timeout("request").is_transient());
        assert!(!ClientError::state("not ready").is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(ClientError::state("not ready").is_permanent());
        assert!(ClientError::auth(AuthErrorReason::Missing, "unregistered").is_permanent());
        assert!(!ClientError::transport("reset").is_permanent());
    }

    #[test]
    fn test_mutual_exclusivity() {
        let errors = [
            ClientError::transport("a"),
            ClientError::timeout("b"),
            ClientError::state("c"),
            ClientError::auth(AuthErrorReason::Unknown, "d"),
        ];
        for err in &errors {
            assert!(err.is_transient() != err.is_permanent(), "{err}");
        }
    }

    #[test]
    fn test_reason_classification() {
        assert_eq!(AuthErrorReason::from_wire("missing"), AuthErrorReason::Missing);
        assert_eq!(
            AuthErrorReason::from_wire("rate_limited"),
            AuthErrorReason::RateLimited
        );
        assert_eq!(
            AuthErrorReason::from_wire("anything"),
            AuthErrorReason::Unknown
        );
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: ClientError = TransportError::Closed.into();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_auth_display() {
        let err = ClientError::auth(AuthErrorReason::Missing, "phone not registered");
        assert!(err.to_string().contains("Missing"));
        assert!(err.to_string().contains("phone not registered"));
    }
}
