//! Fuzz test for structured-message classification
//!
//! Any byte stream either fails JSON parsing or classifies into a
//! ServerMessage without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_proto::ServerMessage;

fuzz_target!(|data: &[u8]| {
    let _ = ServerMessage::from_payload(data);
});
