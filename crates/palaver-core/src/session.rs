//! Session record.
//!
//! The durable outcome of a successful handshake. A session is owned by
//! its client instance, survives reconnects until an explicit logout, and
//! serializes to an opaque record external storage can persist and hand
//! back to [`crate::Client::restore_session`].

use palaver_crypto::SessionKeys;
use serde::{Deserialize, Serialize};

/// Service-assigned identity of the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Service-assigned id (e.g. `"40712345678@s"`).
    pub id: String,
    /// Display name, if the account has one.
    #[serde(default)]
    pub name: Option<String>,
    /// Phone identifier.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Durable record of a successful handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Random client identifier generated with the handshake key material.
    pub client_id: String,
    /// Server-issued session token.
    pub server_token: String,
    /// Client-issued session token.
    pub client_token: String,
    /// Derived key material, when the server delivered a secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_material: Option<SessionKeys>,
    /// Authenticated identity.
    pub identity: Identity,
}
