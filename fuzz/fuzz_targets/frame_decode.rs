//! Fuzz test for frame decoding
//!
//! Malformed wire input must yield an error, never a panic, and a
//! successful decode must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_proto::FrameCodec;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::new();
    if let Ok(frame) = codec.decode(data) {
        // The decoded version is now the codec's per-kind state, so
        // re-encoding must reproduce the original buffer exactly.
        let wire = codec.encode(frame.kind, &frame.payload);
        assert_eq!(wire, data);
    }
});
