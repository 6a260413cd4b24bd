//! Transport abstraction for document and presence synchronization.
//!
//! The sync layer only needs best-effort broadcast of self-contained
//! messages: deltas are idempotent under merge and presence claims age out
//! on their own, so duplicated or reordered delivery is harmless.

use crate::document::DocumentId;
use crate::presence::ParticipantId;
use async_trait::async_trait;
use mindmesh_core::node::NodeId;
use mindmesh_core::nodemap::NodeDelta;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique identifier for a peer on the transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages exchanged between session peers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Node records changed since the sender's last broadcast.
    Delta {
        document_id: DocumentId,
        delta: NodeDelta,
    },
    /// A participant started (or is still) editing a node.
    EditorClaim {
        document_id: DocumentId,
        node: NodeId,
        participant: ParticipantId,
    },
    /// A participant stopped editing a node.
    EditorRelease {
        document_id: DocumentId,
        node: NodeId,
        participant: ParticipantId,
    },
}

/// Transport error type.
#[derive(Clone, Debug)]
pub enum TransportError {
    PeerNotFound(String),
    SendFailed(String),
    Disconnected,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::PeerNotFound(id) => write!(f, "Peer not found: {}", id),
            TransportError::SendFailed(e) => write!(f, "Send failed: {}", e),
            TransportError::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Abstract sync transport.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Send a message to a specific peer.
    async fn send(&self, peer_id: &PeerId, message: SyncMessage) -> Result<(), TransportError>;

    /// Broadcast a message to all connected peers.
    async fn broadcast(&self, message: SyncMessage) -> Result<(), TransportError>;

    /// Get the ids of connected peers.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Take the incoming message stream. May only be called once.
    fn subscribe(&self) -> mpsc::Receiver<(PeerId, SyncMessage)>;
}

type SharedReceiver = Arc<RwLock<Option<mpsc::Receiver<(PeerId, SyncMessage)>>>>;
type SharedOutgoing = Arc<RwLock<HashMap<PeerId, mpsc::Sender<(PeerId, SyncMessage)>>>>;

/// In-memory transport for tests and simulation.
pub struct MemoryTransport {
    local_id: PeerId,
    message_tx: mpsc::Sender<(PeerId, SyncMessage)>,
    message_rx: SharedReceiver,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(local_id: PeerId) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            local_id,
            message_tx: tx,
            message_rx: Arc::new(RwLock::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Wire two transports together, both directions.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.outgoing
            .write()
            .insert(other.local_id.clone(), other.message_tx.clone());
        other
            .outgoing
            .write()
            .insert(self.local_id.clone(), self.message_tx.clone());
    }

    pub fn disconnect_from(&self, peer_id: &PeerId) {
        self.outgoing.write().remove(peer_id);
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    async fn send(&self, peer_id: &PeerId, message: SyncMessage) -> Result<(), TransportError> {
        let tx = self.outgoing.read().get(peer_id).cloned();
        match tx {
            Some(tx) => tx
                .send((self.local_id.clone(), message))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Err(TransportError::PeerNotFound(peer_id.to_string())),
        }
    }

    async fn broadcast(&self, message: SyncMessage) -> Result<(), TransportError> {
        let senders: Vec<_> = self.outgoing.read().values().cloned().collect();
        for tx in senders {
            let _ = tx.send((self.local_id.clone(), message.clone())).await;
        }
        Ok(())
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.outgoing.read().keys().cloned().collect()
    }

    fn subscribe(&self) -> mpsc::Receiver<(PeerId, SyncMessage)> {
        self.message_rx
            .write()
            .take()
            .expect("subscribe can only be called once")
    }
}

/// Create a fully connected mesh of memory transports.
pub fn create_mesh(count: usize) -> Vec<MemoryTransport> {
    let transports: Vec<_> = (0..count)
        .map(|i| MemoryTransport::new(PeerId::new(format!("peer-{}", i))))
        .collect();
    for i in 0..count {
        for j in (i + 1)..count {
            transports[i].connect_to(&transports[j]);
        }
    }
    transports
}
