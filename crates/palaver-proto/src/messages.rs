//! Typed structured control messages.
//!
//! Structured frames carry JSON documents. Outbound documents are built
//! from [`ClientMessage`]; inbound documents are classified into
//! [`ServerMessage`], with anything unrecognized preserved as
//! [`ServerMessage::Other`] so new server traffic degrades gracefully
//! instead of failing decode.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-to-server control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session initialization, sent immediately after transport open.
    ///
    /// With `resume` set the server is expected to skip the handshake and
    /// answer with a success message validated against the carried tokens.
    #[serde(rename_all = "camelCase")]
    Init {
        /// Random client identifier (base64).
        client_id: String,
        /// Client software version string.
        version: String,
        /// Resume an existing session instead of pairing.
        resume: bool,
        /// Server-issued token from a previous session (resume only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_token: Option<String>,
        /// Client-issued token from a previous session (resume only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<String>,
    },

    /// Short-code pairing request.
    #[serde(rename_all = "camelCase")]
    PairRequest {
        /// Fresh per-attempt reference (base64).
        #[serde(rename = "ref")]
        reference: String,
        /// Client public key (base64).
        public_key: String,
        /// Target phone identifier, digits only.
        phone: String,
    },

    /// Explicit logout; the server invalidates the session tokens.
    Logout,
}

impl ClientMessage {
    /// Serialize into a structured payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Server status notifications (`{"status": ...}` documents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Transport-level session accepted; authentication may begin.
    Connected,
    /// Server-reported connection timeout.
    Timeout,
}

/// Handshake success document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeSuccess {
    /// Server-issued session token.
    pub session: String,
    /// Client-issued token echoed (fresh pairing) or validated (resume).
    pub client_token: String,
    /// Service-assigned identity id.
    pub wid: String,
    /// Display name, if the account has one.
    #[serde(default)]
    pub pushname: Option<String>,
    /// Phone identifier of the account.
    #[serde(default)]
    pub phone: Option<String>,
    /// Wrapped session key material (base64), absent on resume.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Classified server-to-client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Connection status notification.
    Status(ServerStatus),
    /// Visual-code handshake reference push.
    Ref {
        /// The handshake reference to render for scanning.
        reference: String,
        /// Server-advertised reference lifetime in milliseconds.
        ttl: Option<u64>,
    },
    /// Handshake success.
    Success(HandshakeSuccess),
    /// Short-code pairing succeeded; code to show on the paired device.
    PairCode {
        /// The short code.
        code: String,
    },
    /// Short-code pairing failed.
    PairError {
        /// Failure reason (`"missing"` = phone not registered).
        reason: String,
    },
    /// Terminal handshake rejection.
    Failure {
        /// Optional reason string.
        reason: Option<String>,
    },
    /// Anything this client version does not recognize.
    Other(Value),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Status { status: ServerStatus },
    Typed(TypedWire),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedWire {
    Ref {
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default)]
        ttl: Option<u64>,
    },
    Success(HandshakeSuccess),
    PairCode { code: String },
    PairError { reason: String },
    Failure {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ServerMessage {
    /// Classify a parsed JSON document.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Wire>(value.clone()) {
            Ok(Wire::Status { status }) => ServerMessage::Status(status),
            Ok(Wire::Typed(TypedWire::Ref { reference, ttl })) => {
                ServerMessage::Ref { reference, ttl }
            }
            Ok(Wire::Typed(TypedWire::Success(success))) => ServerMessage::Success(success),
            Ok(Wire::Typed(TypedWire::PairCode { code })) => ServerMessage::PairCode { code },
            Ok(Wire::Typed(TypedWire::PairError { reason })) => ServerMessage::PairError { reason },
            Ok(Wire::Typed(TypedWire::Failure { reason })) => ServerMessage::Failure { reason },
            Err(_) => ServerMessage::Other(value),
        }
    }

    /// Parse and classify a structured payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the payload is not a JSON
    /// document at all; unrecognized-but-valid documents come back as
    /// [`ServerMessage::Other`].
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(payload)?;
        Ok(Self::from_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_serialization() {
        let init = ClientMessage::Init {
            client_id: "Y2xpZW50".into(),
            version: "0.4.0".into(),
            resume: false,
            server_token: None,
            client_token: None,
        };

        let value: Value = serde_json::from_slice(&init.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["clientId"], "Y2xpZW50");
        assert_eq!(value["resume"], false);
        assert!(value.get("serverToken").is_none());
    }

    #[test]
    fn test_resume_init_carries_tokens() {
        let init = ClientMessage::Init {
            client_id: "id".into(),
            version: "0.4.0".into(),
            resume: true,
            server_token: Some("S1".into()),
            client_token: Some("C1".into()),
        };

        let value: Value = serde_json::from_slice(&init.to_payload().unwrap()).unwrap();
        assert_eq!(value["resume"], true);
        assert_eq!(value["serverToken"], "S1");
        assert_eq!(value["clientToken"], "C1");
    }

    #[test]
    fn test_pair_request_field_names() {
        let req = ClientMessage::PairRequest {
            reference: "cmVm".into(),
            public_key: "cHVi".into(),
            phone: "40712345678".into(),
        };

        let value: Value = serde_json::from_slice(&req.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "pair_request");
        assert_eq!(value["ref"], "cmVm");
        assert_eq!(value["publicKey"], "cHVi");
        assert_eq!(value["phone"], "40712345678");
    }

    #[test]
    fn test_status_connected() {
        let msg = ServerMessage::from_value(json!({"status": "connected"}));
        assert_eq!(msg, ServerMessage::Status(ServerStatus::Connected));
    }

    #[test]
    fn test_status_timeout() {
        let msg = ServerMessage::from_value(json!({"status": "timeout"}));
        assert_eq!(msg, ServerMessage::Status(ServerStatus::Timeout));
    }

    #[test]
    fn test_ref_push() {
        let msg = ServerMessage::from_value(json!({"type": "ref", "ref": "1@abc", "ttl": 20000}));
        assert_eq!(
            msg,
            ServerMessage::Ref {
                reference: "1@abc".into(),
                ttl: Some(20000),
            }
        );
    }

    #[test]
    fn test_success_document() {
        let msg = ServerMessage::from_value(json!({
            "type": "success",
            "session": "S1",
            "clientToken": "C1",
            "wid": "123@s",
        }));

        match msg {
            ServerMessage::Success(success) => {
                assert_eq!(success.session, "S1");
                assert_eq!(success.client_token, "C1");
                assert_eq!(success.wid, "123@s");
                assert_eq!(success.pushname, None);
                assert_eq!(success.secret, None);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_pair_error_missing() {
        let msg = ServerMessage::from_value(json!({"type": "pair_error", "reason": "missing"}));
        assert_eq!(
            msg,
            ServerMessage::PairError {
                reason: "missing".into()
            }
        );
    }

    #[test]
    fn test_unknown_document_preserved() {
        let value = json!({"type": "presence", "from": "123@s"});
        let msg = ServerMessage::from_value(value.clone());
        assert_eq!(msg, ServerMessage::Other(value));
    }

    #[test]
    fn test_unknown_status_preserved() {
        let value = json!({"status": "draining"});
        assert_eq!(
            ServerMessage::from_value(value.clone()),
            ServerMessage::Other(value)
        );
    }

    #[test]
    fn test_non_json_payload_rejected() {
        assert!(ServerMessage::from_payload(b"not json").is_err());
    }
}
