//! Key derivation over BLAKE3.
//!
//! HKDF-shaped extract/expand (RFC 5869 structure, BLAKE3 instead of HMAC)
//! used to turn a Diffie-Hellman shared secret into working keys.

/// HKDF-Extract: condense input key material into a pseudorandom key.
#[must_use]
pub fn extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    if salt.is_empty() {
        return *blake3::hash(ikm).as_bytes();
    }
    let salt_key = *blake3::hash(salt).as_bytes();
    *blake3::keyed_hash(&salt_key, ikm).as_bytes()
}

/// HKDF-Expand: stretch a pseudorandom key into `okm.len()` output bytes
/// bound to `info`.
pub fn expand(prk: &[u8; 32], info: &[u8], okm: &mut [u8]) {
    let mut hasher = blake3::Hasher::new_keyed(prk);
    hasher.update(info);
    hasher.finalize_xof().fill(okm);
}

/// One-shot extract-then-expand with an empty salt.
pub fn derive(ikm: &[u8], info: &[u8], okm: &mut [u8]) {
    let prk = extract(&[], ikm);
    expand(&prk, info, okm);
}

/// Derive a pair of independent 32-byte keys from the same input material.
///
/// The pair is the first and second half of a single 64-byte expansion, so
/// the two keys are domain-separated by position.
#[must_use]
pub fn derive_pair(ikm: &[u8], info: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut okm = [0u8; 64];
    derive(ikm, info, &mut okm);

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    (first, second)
}
