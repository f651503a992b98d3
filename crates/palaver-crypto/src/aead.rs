//! `XChaCha20-Poly1305` authenticated encryption.
//!
//! The extended 192-bit nonce makes random nonce generation safe, which is
//! all the secret-unwrap path needs: each wrapped blob carries its own
//! fresh nonce.

use crate::error::CryptoError;
use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

/// AEAD key size (32 bytes).
pub const KEY_SIZE: usize = 32;

/// Nonce size (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// AEAD encryption key, zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Encrypt and authenticate `plaintext` with associated data.
    ///
    /// Output is `ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptFailed`] on cipher failure.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.0));
        cipher
            .encrypt(nonce.as_generic(), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptFailed)
    }

    /// Decrypt and verify `ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptFailed`] if authentication fails.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.0));
        cipher
            .decrypt(nonce.as_generic(), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

/// AEAD nonce (24 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Wrap raw nonce bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a nonce from a slice of exactly [`NONCE_SIZE`] bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Generate a random nonce.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw nonce bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::XNonce {
        chacha20poly1305::XNonce::from_slice(&self.0)
    }
}
