pub mod error;
pub mod lattice;
pub mod node;
pub mod nodemap;
pub mod stamp;
pub mod tree;

pub use error::{CoreError, Result};
pub use node::{NodeId, NodeKind, NodeRecord, Position};
pub use nodemap::{NodeDelta, NodeMap, Snapshot, Versioned};
pub use stamp::{ReplicaId, WriteStamp};
pub use tree::TreeView;
