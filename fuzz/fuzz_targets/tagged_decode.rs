//! Fuzz test for tagged-payload decoding
//!
//! Tag length fields are attacker-controlled; slicing must always be
//! bounds-checked.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_proto::{decode_tagged, encode_tagged};

fuzz_target!(|data: &[u8]| {
    if let Ok((tag, node)) = decode_tagged(data) {
        // Whatever decoded must round-trip.
        let payload = encode_tagged(&tag, &node).expect("re-encode decoded payload");
        let (tag2, node2) = decode_tagged(&payload).expect("decode re-encoded payload");
        assert_eq!(tag, tag2);
        assert_eq!(node, node2);
    }
});
