//! # Palaver Crypto
//!
//! Cryptographic primitives backing the Palaver handshake:
//! - Handshake key material (x25519 key pair + random client identifier)
//! - HKDF-style key derivation over BLAKE3
//! - `XChaCha20-Poly1305` AEAD
//! - Keyed BLAKE3 MAC with constant-time verification
//! - Session-secret wrap/unwrap (the blob a handshake-success message
//!   carries)
//!
//! Message-body encryption is deliberately out of scope; these primitives
//! cover handshake and session-key material only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod random;
pub mod secret;

pub use aead::{AeadKey, Nonce};
pub use error::CryptoError;
pub use keys::{KeyMaterial, KeyPair, SharedSecret};
pub use secret::{SessionKeys, unwrap_secret, wrap_secret};
