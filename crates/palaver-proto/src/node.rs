//! Tagged node tree and the tagged-binary payload codec.
//!
//! Tagged frames carry a correlation tag followed by a node document. The
//! node document is rendered as structured text (JSON) rather than the
//! service's token-indexed binary encoding; the framing below isolates that
//! choice so a binary node codec can replace it without touching callers.
//!
//! Tagged payload layout:
//!
//! ```text
//! ┌───────────────┬───────────┬────────────────────┐
//! │ tag length    │ tag       │ node document      │
//! │ u16 BE        │ UTF-8     │ JSON               │
//! └───────────────┴───────────┴────────────────────┘
//! ```

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node in the tagged request/response tree.
///
/// Nodes are shaped like the service's wire dictionaries: a description
/// string, a flat attribute map, and optional content that is either child
/// nodes or text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// What this node describes (e.g. `"action"`, `"query"`, `"response"`).
    pub description: String,

    /// Attribute map. Ordered so encoding is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,

    /// Node content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NodeContent>,
}

/// Content carried by a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeContent {
    /// Child nodes.
    Children(Vec<Node>),
    /// Text content (base64 for binary data).
    Text(String),
}

impl Node {
    /// Create a node with no attributes or content.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attrs: BTreeMap::new(),
            content: None,
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Set child nodes as content.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = Some(NodeContent::Children(children));
        self
    }

    /// Set text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content = Some(NodeContent::Text(text.into()));
        self
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Child nodes, or an empty slice for leaf/text nodes.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        match &self.content {
            Some(NodeContent::Children(children)) => children,
            _ => &[],
        }
    }
}

/// Encode a tagged payload (tag + node document).
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the tag exceeds `u16::MAX` bytes
/// or the node fails to serialize.
pub fn encode_tagged(tag: &str, node: &Node) -> Result<Vec<u8>, ProtocolError> {
    let tag_len = u16::try_from(tag.len())
        .map_err(|_| ProtocolError::malformed("correlation tag longer than u16"))?;

    let document = serde_json::to_vec(node)?;
    let mut buf = Vec::with_capacity(2 + tag.len() + document.len());
    buf.extend_from_slice(&tag_len.to_be_bytes());
    buf.extend_from_slice(tag.as_bytes());
    buf.extend_from_slice(&document);
    Ok(buf)
}

/// Decode a tagged payload into its correlation tag and node document.
///
/// Length fields are validated against the remaining buffer before any
/// slicing; hostile input yields an error, never a panic.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] on truncation, a tag length that
/// exceeds the buffer, non-UTF-8 tag bytes, or an undecodable node document.
pub fn decode_tagged(payload: &[u8]) -> Result<(String, Node), ProtocolError> {
    if payload.len() < 2 {
        return Err(ProtocolError::malformed("tagged payload shorter than tag length field"));
    }

    let tag_len = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
    let rest = &payload[2..];
    if tag_len > rest.len() {
        return Err(ProtocolError::malformed("tag length exceeds payload"));
    }

    let tag = std::str::from_utf8(&rest[..tag_len])
        .map_err(|_| ProtocolError::malformed("correlation tag is not UTF-8"))?
        .to_owned();
    let node: Node = serde_json::from_slice(&rest[tag_len..])?;
    Ok((tag, node))
}
