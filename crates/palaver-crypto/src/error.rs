//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic errors.
///
/// Variants deliberately carry no key material or plaintext fragments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// OS CSPRNG failure.
    #[error("OS random source failed")]
    RandomFailed,

    /// Peer public key is a low-order point.
    #[error("low-order public key rejected")]
    LowOrderPoint,

    /// AEAD seal failed.
    #[error("AEAD seal failed")]
    EncryptFailed,

    /// AEAD open rejected the ciphertext.
    #[error("AEAD open failed: ciphertext rejected")]
    DecryptFailed,

    /// MAC did not verify.
    #[error("MAC verification failed")]
    MacMismatch,

    /// Secret blob has the wrong length.
    #[error("bad secret length: expected {expected}, got {actual}")]
    SecretLength {
        /// Expected blob length in bytes.
        expected: usize,
        /// Actual blob length in bytes.
        actual: usize,
    },

    /// Base64 decoding failed.
    #[error("bad base64 encoding")]
    BadEncoding,
}
