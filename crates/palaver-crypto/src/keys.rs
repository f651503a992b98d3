//! Handshake key material.
//!
//! Each handshake attempt owns a fresh x25519 key pair and a random client
//! identifier. The private scalar never leaves the process: there is no
//! serialization path for it, and it is zeroized on drop. On handshake
//! success the public side folds into the session; on failure or expiry the
//! whole [`KeyMaterial`] is discarded.

use crate::error::CryptoError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the random client identifier, pre-encoding.
pub const CLIENT_ID_LEN: usize = 16;

/// X25519 key pair for one handshake attempt.
#[derive(Clone)]
pub struct KeyPair {
    secret: x25519_dalek::StaticSecret,
    public: x25519_dalek::PublicKey,
}

impl KeyPair {
    /// Generate a new key pair with RFC 7748 clamping.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(rng);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Public key, base64-encoded for wire transmission.
    #[must_use]
    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Perform Diffie-Hellman key exchange with a peer public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::LowOrderPoint`] if the exchange produces the
    /// all-zero shared secret.
    pub fn exchange(&self, peer_public: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
        let peer = x25519_dalek::PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer);

        if shared.as_bytes() == &[0u8; 32] {
            return Err(CryptoError::LowOrderPoint);
        }

        Ok(SharedSecret(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_base64())
            .finish_non_exhaustive()
    }
}

/// X25519 shared secret, zeroized on drop.
///
/// Feed this through [`crate::kdf`] before using it as a key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Raw shared-secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

/// Key material for one handshake attempt: key pair + client identifier.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    /// The handshake key pair.
    pub keys: KeyPair,
    /// Random client identifier (base64 of [`CLIENT_ID_LEN`] bytes).
    pub client_id: String,
}

impl KeyMaterial {
    /// Generate fresh key material.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut id = [0u8; CLIENT_ID_LEN];
        rng.fill_bytes(&mut id);
        Self {
            keys: KeyPair::generate(rng),
            client_id: BASE64.encode(id),
        }
    }
}
