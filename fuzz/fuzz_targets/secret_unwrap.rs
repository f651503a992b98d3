//! Fuzz test for session-secret unwrapping
//!
//! Hostile secret blobs must be rejected cleanly: wrong lengths, garbage
//! MACs, and corrupted ciphertexts all map to errors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_crypto::{KeyPair, unwrap_secret};
use rand_core::OsRng;
use std::sync::OnceLock;

static KEYS: OnceLock<KeyPair> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let keys = KEYS.get_or_init(|| KeyPair::generate(&mut OsRng));
    // An arbitrary blob must never unwrap (the MAC gate) nor panic.
    assert!(unwrap_secret(keys, data).is_err());
});
