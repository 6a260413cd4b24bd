//! Node attributes - the flat record stored per node in the map.
//!
//! Children are deliberately NOT stored here; the parent pointer is the only
//! structural attribute, and the adjacency is a derived view (see `tree`).

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Maximum accepted label length. Remote records exceeding this are treated
/// as malformed and dropped from the delta rather than truncated.
pub const MAX_LABEL_LEN: usize = 512;

/// Unique identifier for a node. Never reused after deletion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Generate a fresh globally unique identifier.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic tag for a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The document root.
    Root,
    /// A top-level grouping node.
    Category,
    /// A leaf-level detail node.
    Detail,
    /// Any other application-defined tag.
    Other(String),
}

/// Logical canvas coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Origin of the canvas.
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The full attribute set of a node, stored flat in the node map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Display label.
    pub label: String,
    /// Parent node, or `None` for the root.
    pub parent: Option<NodeId>,
    /// Semantic tag.
    pub kind: NodeKind,
    /// Authoritative display position. Carried in the map so replicas with
    /// different layout engine versions do not race on recompute.
    pub position: Position,
    /// Creation timestamp (milliseconds since epoch). Used for deterministic
    /// child ordering and canonical-root selection.
    pub created_at: u64,
    /// Last modification timestamp (milliseconds since epoch).
    pub modified_at: u64,
    /// Optional user-supplied label override.
    pub custom_label: Option<String>,
    /// Whether the node is shared externally.
    pub shared: bool,
    /// Share link, if shared.
    pub share_link: Option<String>,
}

impl NodeRecord {
    pub fn new(label: impl Into<String>, parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self {
            label: label.into(),
            parent,
            kind,
            position: Position::ORIGIN,
            created_at: 0,
            modified_at: 0,
            custom_label: None,
            shared: false,
            share_link: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_created_at(mut self, ts: u64) -> Self {
        self.created_at = ts;
        self.modified_at = ts;
        self
    }

    /// The label to display: the custom override if present, else the label.
    pub fn display_label(&self) -> &str {
        self.custom_label.as_deref().unwrap_or(&self.label)
    }

    /// Screen a record before it enters the node map.
    ///
    /// Remote deltas are not atomic transactions; a record that fails here
    /// is dropped while the rest of the delta is still applied.
    pub fn validate(&self, id: &NodeId) -> Result<(), CoreError> {
        if id.as_str().is_empty() {
            return Err(CoreError::MalformedRecord {
                id: id.clone(),
                reason: "empty node id".to_string(),
            });
        }
        if !self.position.is_finite() {
            return Err(CoreError::MalformedRecord {
                id: id.clone(),
                reason: "non-finite position".to_string(),
            });
        }
        if self.label.len() > MAX_LABEL_LEN {
            return Err(CoreError::MalformedRecord {
                id: id.clone(),
                reason: format!("label exceeds {} bytes", MAX_LABEL_LEN),
            });
        }
        if self.parent.as_ref() == Some(id) {
            return Err(CoreError::MalformedRecord {
                id: id.clone(),
                reason: "node is its own parent".to_string(),
            });
        }
        Ok(())
    }
}
