//! Session-secret wrap and unwrap.
//!
//! A handshake-success message may carry a `secret` blob holding the
//! session's derived key material, wrapped against the client's handshake
//! public key. Blob layout:
//!
//! ```text
//! ┌────────────────┬──────────┬──────────┬─────────────────────────┐
//! │ server pub key │ MAC      │ nonce    │ sealed keys             │
//! │ 32 bytes       │ 32 bytes │ 24 bytes │ 64 + 16 bytes           │
//! └────────────────┴──────────┴──────────┴─────────────────────────┘
//! ```
//!
//! Unwrap: x25519 exchange with the server public key, derive a key-
//! encryption key and a MAC key, verify the MAC over everything but
//! itself, then open the sealed 64 bytes into the enc/mac session keys.
//! The wrap inverse exists for the in-process test double.

use crate::aead::{AeadKey, NONCE_SIZE, Nonce, TAG_SIZE};
use crate::error::CryptoError;
use crate::kdf;
use crate::keys::KeyPair;
use crate::mac;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// KDF context binding the unwrap keys to this protocol step.
const UNWRAP_INFO: &[u8] = b"palaver-secret-unwrap";

const PUB_LEN: usize = 32;
const SEALED_LEN: usize = 64 + TAG_SIZE;

/// Total secret blob length.
pub const SECRET_LEN: usize = PUB_LEN + mac::MAC_SIZE + NONCE_SIZE + SEALED_LEN;

/// Derived session key material.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Symmetric encryption key.
    #[serde(with = "b64_key")]
    pub enc: [u8; 32],
    /// Message authentication key.
    #[serde(with = "b64_key")]
    pub mac: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Unwrap a secret blob into session keys.
///
/// # Errors
///
/// Returns [`CryptoError::SecretLength`] for a wrong-sized blob,
/// [`CryptoError::LowOrderPoint`] for a degenerate server key,
/// [`CryptoError::MacMismatch`] if the MAC fails, and
/// [`CryptoError::DecryptFailed`] if the sealed keys do not open.
pub fn unwrap_secret(keys: &KeyPair, blob: &[u8]) -> Result<SessionKeys, CryptoError> {
    if blob.len() != SECRET_LEN {
        return Err(CryptoError::SecretLength {
            expected: SECRET_LEN,
            actual: blob.len(),
        });
    }

    let (server_pub, rest) = blob.split_at(PUB_LEN);
    let (tag, rest) = rest.split_at(mac::MAC_SIZE);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_SIZE);

    let server_pub: [u8; 32] = server_pub.try_into().expect("split length");
    let shared = keys.exchange(&server_pub)?;
    let (kek, mac_key) = kdf::derive_pair(shared.as_bytes(), UNWRAP_INFO);

    let mut authed = Vec::with_capacity(PUB_LEN + NONCE_SIZE + SEALED_LEN);
    authed.extend_from_slice(&server_pub);
    authed.extend_from_slice(nonce_bytes);
    authed.extend_from_slice(sealed);
    if !mac::verify(&mac_key, &authed, tag) {
        return Err(CryptoError::MacMismatch);
    }

    let nonce = Nonce::from_slice(nonce_bytes).expect("split length");
    let opened = AeadKey::new(kek).open(&nonce, sealed, &[])?;
    if opened.len() != 64 {
        return Err(CryptoError::DecryptFailed);
    }

    let mut enc = [0u8; 32];
    let mut mac_out = [0u8; 32];
    enc.copy_from_slice(&opened[..32]);
    mac_out.copy_from_slice(&opened[32..]);
    Ok(SessionKeys { enc, mac: mac_out })
}

/// Wrap session keys against a client public key (server side).
///
/// This is the inverse of [`unwrap_secret`], used by the in-process test
/// double standing in for the real service.
///
/// # Errors
///
/// Returns [`CryptoError::LowOrderPoint`] for a degenerate client key or
/// [`CryptoError::EncryptFailed`] on cipher failure.
pub fn wrap_secret<R: RngCore + CryptoRng>(
    server: &KeyPair,
    client_public: &[u8; 32],
    session: &SessionKeys,
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let shared = server.exchange(client_public)?;
    let (kek, mac_key) = kdf::derive_pair(shared.as_bytes(), UNWRAP_INFO);

    let nonce = Nonce::generate(rng);
    let mut plaintext = [0u8; 64];
    plaintext[..32].copy_from_slice(&session.enc);
    plaintext[32..].copy_from_slice(&session.mac);
    let sealed = AeadKey::new(kek).seal(&nonce, &plaintext, &[])?;
    plaintext.zeroize();

    let mut authed = Vec::with_capacity(PUB_LEN + NONCE_SIZE + SEALED_LEN);
    authed.extend_from_slice(&server.public_bytes());
    authed.extend_from_slice(nonce.as_bytes());
    authed.extend_from_slice(&sealed);
    let tag = mac::compute(&mac_key, &authed);

    let mut blob = Vec::with_capacity(SECRET_LEN);
    blob.extend_from_slice(&server.public_bytes());
    blob.extend_from_slice(&tag);
    blob.extend_from_slice(nonce.as_bytes());
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

mod b64_key {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = BASE64
            .decode(&encoded)
            .map_err(|_| D::Error::custom("bad base64 key"))?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("key must be 32 bytes"))
    }
}
