//! End-to-end collaboration tests: several sessions over an in-memory
//! mesh, concurrent edits, presence, and persistence.

use mindmesh_core::node::NodeKind;
use mindmesh_core::stamp::ReplicaId;
use mindmesh_sdk::clock::ManualClock;
use mindmesh_sdk::document::{DocumentId, MindMap, ReadOnlyView};
use mindmesh_sdk::presence::ParticipantId;
use mindmesh_sdk::session::{Session, SessionConfig};
use mindmesh_sdk::store::MemoryStore;
use mindmesh_sdk::transport::{create_mesh, MemoryTransport, PeerId, SyncMessage, SyncTransport};
use mindmesh_sdk::SdkError;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Harness {
    sessions: Vec<Arc<Session<MemoryTransport>>>,
    receivers: Vec<mpsc::Receiver<(PeerId, SyncMessage)>>,
}

/// A document shared by `names.len()` sessions over a full mesh, with each
/// transport's incoming queue held for manual, deterministic delivery.
fn harness(names: &[&str], clock: &Arc<ManualClock>) -> Harness {
    let document_id = DocumentId::new();
    let transports: Vec<Arc<MemoryTransport>> = create_mesh(names.len())
        .into_iter()
        .map(Arc::new)
        .collect();
    let receivers = transports.iter().map(|t| t.subscribe()).collect();
    let sessions = names
        .iter()
        .zip(&transports)
        .enumerate()
        .map(|(i, (name, transport))| {
            Arc::new(Session::new(
                MindMap::new(
                    document_id.clone(),
                    ReplicaId::new(format!("r{}", i + 1)),
                    clock.clone(),
                ),
                ParticipantId::new(*name),
                Arc::clone(transport),
                clock.clone(),
                SessionConfig::default(),
            ))
        })
        .collect();
    Harness {
        sessions,
        receivers,
    }
}

impl Harness {
    /// Deliver every queued message until all queues are empty.
    fn pump(&mut self) {
        loop {
            let mut delivered = false;
            for (session, rx) in self.sessions.iter().zip(self.receivers.iter_mut()) {
                while let Ok((from, message)) = rx.try_recv() {
                    session.handle_message(&from, message);
                    delivered = true;
                }
            }
            if !delivered {
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_three_sessions_converge() {
    let clock = ManualClock::new(1_000);
    let mut h = harness(&["alice", "bob", "carol"], &clock);

    let root = h.sessions[0]
        .edit(|doc| doc.create_root("Project"))
        .await
        .unwrap();
    h.pump();

    // All three edit concurrently, one of them twice.
    h.sessions[0]
        .edit(|doc| doc.add_node(&root, "Design", NodeKind::Category))
        .await
        .unwrap();
    let bob_node = h.sessions[1]
        .edit(|doc| doc.add_node(&root, "Build", NodeKind::Category))
        .await
        .unwrap();
    h.sessions[2]
        .edit(|doc| doc.add_node(&root, "Ship", NodeKind::Category))
        .await
        .unwrap();
    h.sessions[1]
        .edit(|doc| doc.rename(&bob_node, "Build it"))
        .await
        .unwrap();
    h.pump();

    let snapshots: Vec<_> = h
        .sessions
        .iter()
        .map(|s| s.read(|doc| doc.snapshot()))
        .collect();
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
    assert_eq!(h.sessions[0].read(|doc| doc.len()), 4);
    assert_eq!(
        h.sessions[2].read(|doc| doc.label_of(&bob_node).map(str::to_string)),
        Some("Build it".to_string())
    );
    // Every replica reconstructs the same single-rooted tree.
    for session in &h.sessions {
        assert_eq!(session.read(|doc| doc.root().cloned()), Some(root.clone()));
        assert_eq!(session.read(|doc| doc.tree().children_of(&root).len()), 3);
    }
}

#[tokio::test]
async fn test_concurrent_rename_resolves_identically_everywhere() {
    let clock = ManualClock::new(1_000);
    let mut h = harness(&["alice", "bob"], &clock);

    let root = h.sessions[0]
        .edit(|doc| doc.create_root("topic"))
        .await
        .unwrap();
    h.pump();

    // Both rename the same node while messages are still queued.
    h.sessions[0]
        .edit(|doc| doc.rename(&root, "alice's title"))
        .await
        .unwrap();
    h.sessions[1]
        .edit(|doc| doc.rename(&root, "bob's title"))
        .await
        .unwrap();
    h.pump();

    let l1 = h.sessions[0].read(|doc| doc.label_of(&root).map(str::to_string));
    let l2 = h.sessions[1].read(|doc| doc.label_of(&root).map(str::to_string));
    assert_eq!(l1, l2);
    assert!(l1 == Some("alice's title".to_string()) || l1 == Some("bob's title".to_string()));
}

#[tokio::test]
async fn test_concurrent_structure_edits_keep_single_tree() {
    let clock = ManualClock::new(1_000);
    let mut h = harness(&["alice", "bob"], &clock);

    let root = h.sessions[0]
        .edit(|doc| doc.create_root("root"))
        .await
        .unwrap();
    let middle = h.sessions[0]
        .edit(|doc| doc.add_node(&root, "middle", NodeKind::Category))
        .await
        .unwrap();
    let leaf = h.sessions[0]
        .edit(|doc| doc.add_node(&middle, "leaf", NodeKind::Detail))
        .await
        .unwrap();
    h.pump();

    // Alice deletes the middle node while Bob adds a sibling under it.
    h.sessions[0].edit(|doc| doc.remove(&middle)).await.unwrap();
    let late = h.sessions[1]
        .edit(|doc| doc.add_node(&middle, "late arrival", NodeKind::Detail))
        .await
        .unwrap();
    h.pump();

    // Both replicas agree, the tree has one root, and the orphaned nodes
    // were rehomed under the deleted node's former parent.
    let snap1 = h.sessions[0].read(|doc| doc.snapshot());
    let snap2 = h.sessions[1].read(|doc| doc.snapshot());
    assert_eq!(snap1, snap2);
    for session in &h.sessions {
        session.read(|doc| {
            assert!(!doc.contains(&middle));
            assert_eq!(doc.tree().parent_of(&leaf), Some(&root));
            assert_eq!(doc.tree().parent_of(&late), Some(&root));
        });
    }
}

#[tokio::test]
async fn test_presence_lifecycle_across_peers() {
    let clock = ManualClock::new(1_000);
    let mut h = harness(&["alice", "bob"], &clock);

    let root = h.sessions[0]
        .edit(|doc| doc.create_root("root"))
        .await
        .unwrap();
    h.pump();

    h.sessions[0].begin_editing(root.clone()).await.unwrap();
    h.pump();
    assert_eq!(
        h.sessions[1].active_editors(&root),
        vec![ParticipantId::new("alice")]
    );

    // Alice vanishes; her claim ages out on Bob's side without a release.
    clock.advance(SessionConfig::default().presence_timeout_ms + 1);
    assert!(h.sessions[1].active_editors(&root).is_empty());
}

#[tokio::test]
async fn test_edit_error_does_not_broadcast() {
    let clock = ManualClock::new(1_000);
    let mut h = harness(&["alice", "bob"], &clock);

    h.sessions[0]
        .edit(|doc| doc.create_root("root"))
        .await
        .unwrap();
    let result = h.sessions[0].edit(|doc| doc.create_root("second root")).await;
    assert!(matches!(result, Err(SdkError::Edit(_))));
    h.pump();

    // Only the first edit reached Bob.
    assert_eq!(h.sessions[1].read(|doc| doc.len()), 1);
}

#[tokio::test]
async fn test_save_and_read_only_view() {
    let clock = ManualClock::new(1_000);
    let store = MemoryStore::new();
    let mut doc = MindMap::new(DocumentId::new(), ReplicaId::new("r1"), clock.clone());
    let root = doc.create_root("published").unwrap();
    doc.add_node(&root, "child", NodeKind::Detail).unwrap();
    doc.save_to(&store).await.unwrap();

    let view = ReadOnlyView::load(&store, doc.id()).await.unwrap();
    assert_eq!(view.root(), Some(&root));
    assert_eq!(view.len(), 2);
    assert_eq!(view.label_of(&root), Some("published"));
    assert_eq!(view.position_of(&root), doc.position_of(&root));
}
