//! Frame encoding and decoding for the Palaver wire protocol.
//!
//! Every unit of wire data is a frame: a 2-byte magic constant, a 4-byte
//! kind/version descriptor, and the payload. The first descriptor byte
//! selects the payload kind; the remaining three carry version information
//! that is opaque to the client and reproduced on outgoing frames from the
//! most recent inbound frame of the same kind.

use crate::PROTOCOL_VERSION;
use crate::error::ProtocolError;

/// Frame magic constant.
pub const FRAME_MAGIC: [u8; 2] = *b"PV";

/// Fixed frame header size in bytes (magic + kind/version descriptor).
pub const FRAME_HEADER_SIZE: usize = 6;

/// Payload kinds carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Self-delimited JSON control document.
    Structured = 0x01,
    /// Correlation tag followed by an opaque node document.
    Tagged = 0x02,
}

impl TryFrom<u8> for FrameKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Structured),
            0x02 => Ok(Self::Tagged),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

impl FrameKind {
    fn index(self) -> usize {
        match self {
            Self::Structured => 0,
            Self::Tagged => 1,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload kind.
    pub kind: FrameKind,
    /// Opaque version bytes from the descriptor.
    pub version: [u8; 3],
    /// Payload bytes (everything after the header).
    pub payload: Vec<u8>,
}

/// Stateful frame codec.
///
/// The codec tracks the last-seen version bytes per payload kind so that
/// outgoing frames echo whatever the server most recently advertised. A
/// fresh codec uses [`PROTOCOL_VERSION`] until the first inbound frame of
/// that kind arrives. One codec instance belongs to one connection epoch.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    versions: [[u8; 3]; 2],
}

impl FrameCodec {
    /// Create a codec with the default protocol version for both kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: [PROTOCOL_VERSION; 2],
        }
    }

    /// Encode a payload into a wire frame.
    #[must_use]
    pub fn encode(&self, kind: FrameKind, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.push(kind as u8);
        buf.extend_from_slice(&self.versions[kind.index()]);
        buf.extend_from_slice(payload);
        buf
    }

    /// Decode a wire frame, updating the per-kind version state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for a buffer shorter than the
    /// header or with a mismatched magic, and [`ProtocolError::UnknownKind`]
    /// for an unrecognized kind byte. Never panics on hostile input.
    pub fn decode(&mut self, data: &[u8]) -> Result<Frame, ProtocolError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::malformed("buffer shorter than frame header"));
        }
        if data[0..2] != FRAME_MAGIC {
            return Err(ProtocolError::malformed("bad frame magic"));
        }

        let kind = FrameKind::try_from(data[2])?;
        let version = [data[3], data[4], data[5]];
        self.versions[kind.index()] = version;

        Ok(Frame {
            kind,
            version,
            payload: data[FRAME_HEADER_SIZE..].to_vec(),
        })
    }

    /// Last-seen version bytes for a payload kind.
    #[must_use]
    pub fn version_for(&self, kind: FrameKind) -> [u8; 3] {
        self.versions[kind.index()]
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
