//! # Mindmesh SDK
//!
//! High-level client library for collaborative mind maps. A [`MindMap`] is
//! one replica of a shared document: edits apply locally without waiting
//! on the network, deltas broadcast to peers, and concurrent changes merge
//! deterministically. A [`Session`] wires a replica to a transport and
//! tracks which participant is editing which node.
//!
//! ## Example
//!
//! ```
//! use mindmesh_sdk::clock::SystemClock;
//! use mindmesh_sdk::document::{DocumentId, MindMap};
//! use mindmesh_core::node::NodeKind;
//! use mindmesh_core::stamp::ReplicaId;
//! use std::sync::Arc;
//!
//! let mut doc = MindMap::new(
//!     DocumentId::new(),
//!     ReplicaId::new("replica-1"),
//!     Arc::new(SystemClock),
//! );
//! let root = doc.create_root("Weekend plans").unwrap();
//! let hiking = doc.add_node(&root, "Hiking", NodeKind::Category).unwrap();
//! doc.add_node(&hiking, "Pack water", NodeKind::Detail).unwrap();
//!
//! assert_eq!(doc.tree().children_of(&root), &[hiking]);
//! ```

pub mod clock;
pub mod document;
pub mod error;
pub mod presence;
pub mod session;
pub mod store;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{DocumentId, MindMap, ReadOnlyView};
pub use error::{Result, SdkError};
pub use presence::{ParticipantId, PresenceTracker};
pub use session::{Session, SessionConfig, SessionEvent};
pub use store::{DocumentStore, MemoryStore, StoreError};
pub use transport::{MemoryTransport, PeerId, SyncMessage, SyncTransport};

pub use mindmesh_core as core;
pub use mindmesh_layout as layout;
