//! Error types for the Palaver wire protocol.

use std::borrow::Cow;
use thiserror::Error;

/// Protocol-level errors.
///
/// Malformed input is a data condition, not a program fault: decoding a
/// hostile or truncated buffer returns one of these variants and never
/// panics.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is malformed: too short, bad magic, inconsistent length
    /// fields, or an undecodable payload document.
    #[error("malformed frame: {0}")]
    Malformed(Cow<'static, str>),

    /// Kind byte does not name a known payload kind.
    #[error("unknown frame kind: 0x{0:02X}")]
    UnknownKind(u8),
}

impl ProtocolError {
    /// Create a malformed-frame error with static context (zero allocation).
    #[must_use]
    pub const fn malformed(context: &'static str) -> Self {
        ProtocolError::Malformed(Cow::Borrowed(context))
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(Cow::Owned(format!("payload document: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = ProtocolError::malformed("buffer shorter than header");
        assert!(err.to_string().contains("malformed frame"));
        assert!(err.to_string().contains("buffer shorter than header"));
    }

    #[test]
    fn test_unknown_kind_display() {
        let err = ProtocolError::UnknownKind(0x7F);
        assert_eq!(err.to_string(), "unknown frame kind: 0x7F");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
