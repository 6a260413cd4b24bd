//! A participant's live connection to one shared document.
//!
//! The session owns the document replica, the presence table, and the
//! transport. Local edits go through [`Session::edit`], which broadcasts
//! the resulting delta; remote messages are funneled through a single
//! receiver so every mutation of the replica happens on one logical path.
//! Two background loops keep presence honest: a heartbeat loop that
//! rebroadcasts the local participant's claims, and a sweep loop that
//! drops claims whose participant went silent.

use crate::clock::Clock;
use crate::document::{DocumentId, MindMap};
use crate::error::{Result, SdkError};
use crate::presence::{ParticipantId, PresenceTracker};
use crate::transport::{PeerId, SyncMessage, SyncTransport};
use mindmesh_core::node::NodeId;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Timing knobs for a session.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// How often the local participant's claims are refreshed and
    /// rebroadcast.
    pub heartbeat_interval_ms: u64,
    /// How often expired claims are swept out of the presence table.
    pub sweep_interval_ms: u64,
    /// How long a claim survives without a heartbeat.
    pub presence_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            sweep_interval_ms: 5_000,
            presence_timeout_ms: crate::presence::DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Events emitted to session observers (a UI, a logger, a test).
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// A remote delta was merged; these nodes changed.
    RemoteApplied { nodes: Vec<NodeId> },
    /// A local delta was broadcast to peers.
    DeltaBroadcast { records: usize },
    /// The set of editors on a node changed.
    EditorsChanged { node: NodeId },
}

/// A live editing session for one document.
pub struct Session<T: SyncTransport> {
    document: Arc<RwLock<MindMap>>,
    document_id: DocumentId,
    presence: Arc<RwLock<PresenceTracker>>,
    participant: ParticipantId,
    transport: Arc<T>,
    event_tx: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
}

impl<T: SyncTransport> Session<T> {
    pub fn new(
        document: MindMap,
        participant: ParticipantId,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let document_id = document.id().clone();
        let presence = PresenceTracker::new(clock).with_timeout(config.presence_timeout_ms);
        let (event_tx, _) = broadcast::channel(256);
        Self {
            document: Arc::new(RwLock::new(document)),
            document_id,
            presence: Arc::new(RwLock::new(presence)),
            participant,
            transport,
            event_tx,
            config,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Shared handle to the document replica.
    pub fn document(&self) -> Arc<RwLock<MindMap>> {
        Arc::clone(&self.document)
    }

    /// Read from the document without mutating it.
    pub fn read<R>(&self, f: impl FnOnce(&MindMap) -> R) -> R {
        f(&self.document.read())
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Apply a local edit and broadcast the resulting delta.
    pub async fn edit<R>(&self, f: impl FnOnce(&mut MindMap) -> Result<R>) -> Result<R> {
        let (out, delta) = {
            let mut document = self.document.write();
            let out = f(&mut document)?;
            (out, document.take_delta())
        };
        if let Some(delta) = delta {
            let records = delta.len();
            self.transport
                .broadcast(SyncMessage::Delta {
                    document_id: self.document_id.clone(),
                    delta,
                })
                .await
                .map_err(|e| SdkError::NetworkError(e.to_string()))?;
            let _ = self.event_tx.send(SessionEvent::DeltaBroadcast { records });
        }
        Ok(out)
    }

    // === Presence ===

    /// Announce that the local participant is editing `node`.
    pub async fn begin_editing(&self, node: NodeId) -> Result<()> {
        self.presence
            .write()
            .acquire(node.clone(), self.participant.clone());
        self.transport
            .broadcast(SyncMessage::EditorClaim {
                document_id: self.document_id.clone(),
                node: node.clone(),
                participant: self.participant.clone(),
            })
            .await
            .map_err(|e| SdkError::NetworkError(e.to_string()))?;
        let _ = self.event_tx.send(SessionEvent::EditorsChanged { node });
        Ok(())
    }

    /// Announce that the local participant stopped editing `node`.
    pub async fn finish_editing(&self, node: NodeId) -> Result<()> {
        self.presence.write().release(&node, &self.participant);
        self.transport
            .broadcast(SyncMessage::EditorRelease {
                document_id: self.document_id.clone(),
                node: node.clone(),
                participant: self.participant.clone(),
            })
            .await
            .map_err(|e| SdkError::NetworkError(e.to_string()))?;
        let _ = self.event_tx.send(SessionEvent::EditorsChanged { node });
        Ok(())
    }

    /// Who is editing `node` right now, expired claims excluded.
    pub fn active_editors(&self, node: &NodeId) -> Vec<ParticipantId> {
        self.presence.read().active_editors(node)
    }

    // === Incoming messages ===

    /// Apply one incoming message. The message loop calls this for every
    /// received message, serializing all remote mutations.
    pub fn handle_message(&self, from: &PeerId, message: SyncMessage) {
        match message {
            SyncMessage::Delta { document_id, delta } => {
                if document_id != self.document_id {
                    tracing::debug!(%from, %document_id, "ignoring delta for another document");
                    return;
                }
                let nodes = self.document.write().apply_remote(&delta);
                if !nodes.is_empty() {
                    tracing::debug!(%from, count = nodes.len(), "applied remote delta");
                    let _ = self.event_tx.send(SessionEvent::RemoteApplied { nodes });
                }
            }
            SyncMessage::EditorClaim {
                document_id,
                node,
                participant,
            } => {
                if document_id != self.document_id || participant == self.participant {
                    return;
                }
                self.presence
                    .write()
                    .apply_remote_claim(node.clone(), participant);
                let _ = self.event_tx.send(SessionEvent::EditorsChanged { node });
            }
            SyncMessage::EditorRelease {
                document_id,
                node,
                participant,
            } => {
                if document_id != self.document_id || participant == self.participant {
                    return;
                }
                self.presence.write().release(&node, &participant);
                let _ = self.event_tx.send(SessionEvent::EditorsChanged { node });
            }
        }
    }

    /// Consume the transport's incoming stream on a background task.
    pub fn spawn_message_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut rx = self.transport.subscribe();
        tokio::spawn(async move {
            while let Some((from, message)) = rx.recv().await {
                session.handle_message(&from, message);
            }
            tracing::debug!("transport closed, message loop exiting");
        })
    }

    /// Keep the local participant's claims alive and sweep out dead ones.
    pub fn spawn_presence_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut heartbeat =
                tokio::time::interval(Duration::from_millis(session.config.heartbeat_interval_ms));
            let mut sweep =
                tokio::time::interval(Duration::from_millis(session.config.sweep_interval_ms));
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => session.heartbeat_tick().await,
                    _ = sweep.tick() => session.sweep_tick(),
                }
            }
        })
    }

    async fn heartbeat_tick(&self) {
        let claims = {
            let mut presence = self.presence.write();
            presence.heartbeat(&self.participant);
            presence.claims_of(&self.participant)
        };
        for node in claims {
            let _ = self
                .transport
                .broadcast(SyncMessage::EditorClaim {
                    document_id: self.document_id.clone(),
                    node,
                    participant: self.participant.clone(),
                })
                .await;
        }
    }

    fn sweep_tick(&self) {
        let expired = {
            let mut presence = self.presence.write();
            // Claims on deleted nodes have nothing left to point at.
            presence.prune_missing(self.document.read().tree());
            presence.sweep()
        };
        for (node, participant) in expired {
            tracing::debug!(%node, %participant, "presence claim expired");
            let _ = self.event_tx.send(SessionEvent::EditorsChanged { node });
        }
    }
}
