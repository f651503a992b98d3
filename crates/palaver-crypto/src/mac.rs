//! Keyed BLAKE3 message authentication.

use subtle::ConstantTimeEq;

/// MAC output size (32 bytes).
pub const MAC_SIZE: usize = 32;

/// Compute a keyed-BLAKE3 MAC over `data`.
#[must_use]
pub fn compute(key: &[u8; 32], data: &[u8]) -> [u8; MAC_SIZE] {
    *blake3::keyed_hash(key, data).as_bytes()
}

/// Verify a MAC in constant time.
///
/// A wrong-length `expected` fails without leaking timing about the key.
#[must_use]
pub fn verify(key: &[u8; 32], data: &[u8], expected: &[u8]) -> bool {
    if expected.len() != MAC_SIZE {
        return false;
    }
    let tag = compute(key, data);
    tag[..].ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = [7u8; 32];
        let tag = compute(&key, b"payload");
        assert!(verify(&key, b"payload", &tag));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let tag = compute(&[1u8; 32], b"payload");
        assert!(!verify(&[2u8; 32], b"payload", &tag));
    }

    #[test]
    fn test_tampered_data_rejected() {
        let key = [7u8; 32];
        let tag = compute(&key, b"payload");
        assert!(!verify(&key, b"payloae", &tag));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let key = [7u8; 32];
        assert!(!verify(&key, b"payload", &[0u8; 16]));
        assert!(!verify(&key, b"payload", &[]));
    }
}
