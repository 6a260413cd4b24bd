//! Error types for the core document engine.

use crate::node::NodeId;
use thiserror::Error;

/// Errors that can occur when validating or mutating the node map.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    #[error("Parent not found: {0}")]
    UnknownParent(NodeId),

    #[error("Reparenting {node} under {new_parent} would create a cycle")]
    CycleWouldForm { node: NodeId, new_parent: NodeId },

    #[error("Malformed node record for {id}: {reason}")]
    MalformedRecord { id: NodeId, reason: String },

    #[error("Document already has a root node: {0}")]
    RootExists(NodeId),
}

pub type Result<T> = std::result::Result<T, CoreError>;
