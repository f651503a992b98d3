//! Property-based tests for the Palaver wire protocol and policies.
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Frame Codec Properties
// ============================================================================

mod frame_properties {
    use super::*;
    use palaver_proto::{FRAME_HEADER_SIZE, FrameCodec, FrameKind};

    proptest! {
        /// Round-trip: decode(encode(kind, payload)) preserves both.
        #[test]
        fn frame_roundtrip(
            structured in any::<bool>(),
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let kind = if structured { FrameKind::Structured } else { FrameKind::Tagged };
            let mut codec = FrameCodec::new();

            let wire = codec.encode(kind, &payload);
            prop_assert_eq!(wire.len(), FRAME_HEADER_SIZE + payload.len());

            let frame = codec.decode(&wire).unwrap();
            prop_assert_eq!(frame.kind, kind);
            prop_assert_eq!(frame.payload, payload);
        }

        /// Arbitrary buffers decode to a result, never a panic.
        #[test]
        fn decode_never_panics(buffer in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut codec = FrameCodec::new();
            let _ = codec.decode(&buffer);
        }

        /// Version bytes advertised by the peer are echoed on the next
        /// outgoing frame of the same kind.
        #[test]
        fn version_passthrough(version in any::<[u8; 3]>()) {
            let mut codec = FrameCodec::new();
            let mut wire = codec.encode(FrameKind::Structured, b"{}");
            wire[3..6].copy_from_slice(&version);
            codec.decode(&wire).unwrap();

            let out = codec.encode(FrameKind::Structured, b"{}");
            prop_assert_eq!(&out[3..6], &version[..]);
        }
    }
}

// ============================================================================
// Tagged Payload Properties
// ============================================================================

mod tagged_properties {
    use super::*;
    use palaver_proto::{Node, decode_tagged, encode_tagged};

    fn arb_node() -> impl Strategy<Value = Node> {
        (
            "[a-z]{1,12}",
            proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..6),
            proptest::option::of("[ -~]{0,32}"),
        )
            .prop_map(|(description, attrs, text)| {
                let mut node = Node::new(description);
                node.attrs = attrs;
                if let Some(text) = text {
                    node = node.with_text(text);
                }
                node
            })
    }

    proptest! {
        /// Round-trip: tag and node survive encode/decode.
        #[test]
        fn tagged_roundtrip(tag in "[0-9]{1,10}\\.--[0-9]{1,6}", node in arb_node()) {
            let payload = encode_tagged(&tag, &node).unwrap();
            let (decoded_tag, decoded_node) = decode_tagged(&payload).unwrap();
            prop_assert_eq!(decoded_tag, tag);
            prop_assert_eq!(decoded_node, node);
        }

        /// Arbitrary payload bytes never panic the decoder.
        #[test]
        fn decode_tagged_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_tagged(&payload);
        }
    }
}

// ============================================================================
// Structured Document Properties
// ============================================================================

mod structured_properties {
    use super::*;
    use palaver_proto::ServerMessage;

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,16}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4)
                    .prop_map(serde_json::Value::Array),
                proptest::collection::btree_map("[a-z]{1,8}", inner, 0..4).prop_map(|map| {
                    serde_json::Value::Object(map.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        /// Any well-formed document classifies without loss: recognized
        /// shapes parse, everything else is preserved verbatim.
        #[test]
        fn classification_is_total(document in arb_json()) {
            let classified = ServerMessage::from_value(document.clone());
            if let ServerMessage::Other(preserved) = classified {
                prop_assert_eq!(preserved, document);
            }
        }
    }
}

// ============================================================================
// Reconnection Policy Properties
// ============================================================================

mod reconnect_properties {
    use super::*;
    use palaver_core::reconnect::{ReconnectState, backoff_delay};
    use std::time::Duration;

    proptest! {
        /// Delays follow base * 1.5^(n-1) and grow monotonically.
        #[test]
        fn backoff_formula(base_ms in 1u64..60_000, attempt in 1u32..20) {
            let base = Duration::from_millis(base_ms);
            let delay = backoff_delay(base, attempt);
            let expected = base.mul_f64(1.5f64.powi(attempt as i32 - 1));
            prop_assert_eq!(delay, expected);

            if attempt > 1 {
                prop_assert!(delay > backoff_delay(base, attempt - 1));
            }
        }

        /// The counter never exceeds the configured maximum.
        #[test]
        fn attempts_bounded(max in 0u32..16) {
            let mut state = ReconnectState::new();
            let base = Duration::from_millis(10);

            let mut granted = 0;
            while state.next_delay(base, max).is_some() {
                granted += 1;
                prop_assert!(granted <= max);
            }
            prop_assert_eq!(granted, max);
            prop_assert_eq!(state.attempts(), max);
        }
    }
}

// ============================================================================
// Tag Uniqueness Properties
// ============================================================================

mod tag_properties {
    use super::*;
    use palaver_core::TagRegistry;

    proptest! {
        /// Tags never repeat within a registry, whatever the issue count.
        #[test]
        fn tags_unique(count in 1usize..512) {
            let registry = TagRegistry::new();
            let mut seen = std::collections::HashSet::new();
            for _ in 0..count {
                prop_assert!(seen.insert(registry.next_tag()));
            }
        }
    }
}
