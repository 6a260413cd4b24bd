//! A replicated mind-map document.
//!
//! [`MindMap`] ties the pieces together for one replica: the node map holds
//! the merged truth, the tree view is derived from it after every change,
//! and the layout engine assigns canvas positions to local structural
//! edits. Computed positions are written back into the node records, so
//! peers and readers take positions from the map instead of racing to
//! recompute them; remote deltas therefore arrive with their positions
//! already decided and only mark the local layout cache stale.

use crate::clock::Clock;
use crate::error::{Result, SdkError};
use crate::store::{DocumentStore, StoreError};
use mindmesh_core::error::CoreError;
use mindmesh_core::node::{NodeId, NodeKind, NodeRecord, Position};
use mindmesh_core::nodemap::{NodeDelta, NodeMap, Snapshot};
use mindmesh_core::stamp::ReplicaId;
use mindmesh_core::tree::TreeView;
use mindmesh_layout::{LayoutConfig, LayoutEngine, LayoutStrategy, TreeEdit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use ulid::Ulid;

/// Unique identifier for a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many times a save retries after losing the version race.
pub const SAVE_RETRY_LIMIT: u32 = 3;

/// One replica of a collaborative mind map.
pub struct MindMap {
    id: DocumentId,
    clock: Arc<dyn Clock>,
    map: NodeMap,
    tree: TreeView,
    layout: LayoutEngine,
    /// Remote merges invalidate the layout cache; it is refreshed before
    /// the next local structural edit rather than on every delta.
    layout_stale: bool,
    /// Last version seen from the store, for optimistic saves.
    version: u64,
}

impl MindMap {
    pub fn new(id: DocumentId, replica: ReplicaId, clock: Arc<dyn Clock>) -> Self {
        Self::with_strategy(id, replica, clock, LayoutStrategy::default())
    }

    pub fn with_strategy(
        id: DocumentId,
        replica: ReplicaId,
        clock: Arc<dyn Clock>,
        strategy: LayoutStrategy,
    ) -> Self {
        Self {
            id,
            clock,
            map: NodeMap::new(replica),
            tree: TreeView::default(),
            layout: LayoutEngine::new(strategy, LayoutConfig::default()),
            layout_stale: false,
            version: 0,
        }
    }

    /// Restore a replica from a persisted snapshot.
    pub fn from_snapshot(
        id: DocumentId,
        replica: ReplicaId,
        clock: Arc<dyn Clock>,
        snapshot: Snapshot,
        version: u64,
    ) -> Self {
        let map = NodeMap::from_snapshot(replica, snapshot);
        let tree = TreeView::reconstruct(&map);
        Self {
            id,
            clock,
            map,
            tree,
            layout: LayoutEngine::new(LayoutStrategy::default(), LayoutConfig::default()),
            layout_stale: true,
            version,
        }
    }

    /// Load the latest snapshot of `id` from a store.
    pub async fn load_from(
        store: &dyn DocumentStore,
        id: DocumentId,
        replica: ReplicaId,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (snapshot, version) = store
            .load(&id)
            .await
            .map_err(|e| SdkError::StoreError(e.to_string()))?;
        Ok(Self::from_snapshot(id, replica, clock, snapshot, version))
    }

    // === Accessors ===

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn replica(&self) -> &ReplicaId {
        self.map.replica()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn tree(&self) -> &TreeView {
        &self.tree
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.map.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.map.contains_live(id)
    }

    pub fn record_of(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.map.get(id)
    }

    pub fn label_of(&self, id: &NodeId) -> Option<&str> {
        self.map.get(id).map(NodeRecord::display_label)
    }

    /// The authoritative display position, from the node record.
    pub fn position_of(&self, id: &NodeId) -> Option<Position> {
        self.map.get(id).map(|record| record.position)
    }

    pub fn strategy(&self) -> LayoutStrategy {
        self.layout.strategy()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.map.snapshot()
    }

    // === Local edits ===

    /// Create the root node of an empty document.
    pub fn create_root(&mut self, label: impl Into<String>) -> Result<NodeId> {
        if let Some(root) = self.tree.root() {
            return Err(CoreError::RootExists(root.clone()).into());
        }
        let id = NodeId::new();
        let record = NodeRecord::new(label, None, NodeKind::Root)
            .with_created_at(self.clock.now_millis());
        record.validate(&id)?;
        self.map.set(id.clone(), record);
        self.relayout_after(TreeEdit::Inserted { parent: id.clone() });
        Ok(id)
    }

    /// Add a node under an existing parent.
    pub fn add_node(
        &mut self,
        parent: &NodeId,
        label: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId> {
        if !self.map.contains_live(parent) {
            return Err(CoreError::UnknownParent(parent.clone()).into());
        }
        let id = NodeId::new();
        let record = NodeRecord::new(label, Some(parent.clone()), kind)
            .with_created_at(self.clock.now_millis());
        record.validate(&id)?;
        self.map.set(id.clone(), record);
        self.relayout_after(TreeEdit::Inserted {
            parent: parent.clone(),
        });
        Ok(id)
    }

    /// Change a node's label.
    pub fn rename(&mut self, id: &NodeId, label: impl Into<String>) -> Result<()> {
        let mut record = self.live_record(id)?;
        record.label = label.into();
        record.modified_at = self.clock.now_millis();
        record.validate(id)?;
        self.map.set(id.clone(), record);
        Ok(())
    }

    /// Set or clear the user-facing label override.
    pub fn set_custom_label(&mut self, id: &NodeId, custom: Option<String>) -> Result<()> {
        let mut record = self.live_record(id)?;
        record.custom_label = custom;
        record.modified_at = self.clock.now_millis();
        record.validate(id)?;
        self.map.set(id.clone(), record);
        Ok(())
    }

    /// Mark a node as shared and return its share link.
    pub fn share(&mut self, id: &NodeId) -> Result<String> {
        let mut record = self.live_record(id)?;
        let link = format!("mindmesh://share/{}/{}", self.id, id);
        record.shared = true;
        record.share_link = Some(link.clone());
        record.modified_at = self.clock.now_millis();
        self.map.set(id.clone(), record);
        Ok(link)
    }

    /// Revoke sharing for a node.
    pub fn unshare(&mut self, id: &NodeId) -> Result<()> {
        let mut record = self.live_record(id)?;
        record.shared = false;
        record.share_link = None;
        record.modified_at = self.clock.now_millis();
        self.map.set(id.clone(), record);
        Ok(())
    }

    /// Manually pin a node to a canvas position.
    pub fn move_to(&mut self, id: &NodeId, position: Position) -> Result<()> {
        if !position.is_finite() {
            return Err(CoreError::MalformedRecord {
                id: id.clone(),
                reason: "non-finite position".to_string(),
            }
            .into());
        }
        let mut record = self.live_record(id)?;
        record.position = position;
        record.modified_at = self.clock.now_millis();
        self.map.set(id.clone(), record);
        Ok(())
    }

    /// Move a node (with its subtree) under a new parent.
    pub fn reparent(&mut self, id: &NodeId, new_parent: &NodeId) -> Result<()> {
        let mut record = self.live_record(id)?;
        if !self.map.contains_live(new_parent) {
            return Err(CoreError::UnknownParent(new_parent.clone()).into());
        }
        if new_parent == id || self.tree.is_ancestor(id, new_parent) {
            return Err(CoreError::CycleWouldForm {
                node: id.clone(),
                new_parent: new_parent.clone(),
            }
            .into());
        }
        let old_parent = record.parent.take();
        record.parent = Some(new_parent.clone());
        record.modified_at = self.clock.now_millis();
        self.map.set(id.clone(), record);

        match old_parent {
            Some(old_parent) => self.relayout_after(TreeEdit::Reparented {
                old_parent,
                new_parent: new_parent.clone(),
            }),
            // The old root moved below another node; the whole canvas
            // reorganizes around the new root.
            None => self.relayout_full(),
        }
        Ok(())
    }

    /// Delete a node. Its descendants are not deleted; the tree view
    /// rehomes them under the nearest live ancestor.
    pub fn remove(&mut self, id: &NodeId) -> Result<()> {
        if !self.map.contains_live(id) {
            return Err(CoreError::UnknownNode(id.clone()).into());
        }
        let former_parent = self.tree.parent_of(id).cloned();
        self.map.delete(id);
        match former_parent {
            Some(former_parent) => self.relayout_after(TreeEdit::Removed { former_parent }),
            None => self.relayout_full(),
        }
        Ok(())
    }

    /// Switch the layout strategy; relayouts the whole document.
    pub fn set_strategy(&mut self, strategy: LayoutStrategy) {
        let update = self.layout.set_strategy(strategy, &self.tree);
        self.layout_stale = false;
        self.adopt_positions(&update.moved);
    }

    // === Synchronization ===

    /// Take the locally buffered writes for broadcast.
    pub fn take_delta(&mut self) -> Option<NodeDelta> {
        self.map.take_delta()
    }

    /// Merge a delta from a remote replica.
    ///
    /// Each record is screened first; a malformed record is dropped with a
    /// warning while the rest of the delta still applies. Returns the ids
    /// whose winning record changed.
    pub fn apply_remote(&mut self, delta: &NodeDelta) -> Vec<NodeId> {
        let mut clean = NodeDelta::default();
        for (id, versioned) in &delta.records {
            match versioned.slot.record().validate(id) {
                Ok(()) => {
                    clean.records.insert(id.clone(), versioned.clone());
                }
                Err(e) => {
                    tracing::warn!(node = %id, error = %e, "dropping malformed record from remote delta");
                }
            }
        }
        let changed = self.map.merge(&clean);
        if !changed.is_empty() {
            self.tree = TreeView::reconstruct(&self.map);
            self.layout_stale = true;
        }
        changed
    }

    /// Persist the current snapshot, merging and retrying on version
    /// conflicts.
    pub async fn save_to(&mut self, store: &dyn DocumentStore) -> Result<()> {
        for attempt in 1..=SAVE_RETRY_LIMIT {
            match store.save(&self.id, &self.map.snapshot(), self.version).await {
                Ok(version) => {
                    self.version = version;
                    return Ok(());
                }
                Err(StoreError::VersionConflict { .. }) => {
                    let (snapshot, version) = store
                        .load(&self.id)
                        .await
                        .map_err(|e| SdkError::StoreError(e.to_string()))?;
                    self.apply_remote(&snapshot);
                    self.version = version;
                    tracing::debug!(
                        document = %self.id,
                        attempt,
                        "save conflicted, merged latest snapshot and retrying"
                    );
                }
                Err(e) => return Err(SdkError::StoreError(e.to_string())),
            }
        }
        Err(SdkError::VersionConflict {
            document: self.id.to_string(),
            attempts: SAVE_RETRY_LIMIT,
        })
    }

    // === Internals ===

    fn live_record(&self, id: &NodeId) -> Result<NodeRecord> {
        self.map
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownNode(id.clone()).into())
    }

    /// Rebuild the tree and reposition what the edit touched.
    fn relayout_after(&mut self, edit: TreeEdit) {
        self.tree = TreeView::reconstruct(&self.map);
        let update = if self.layout_stale {
            self.layout_stale = false;
            self.layout.full_layout(&self.tree)
        } else {
            self.layout.apply(&self.tree, &edit)
        };
        self.adopt_positions(&update.moved);
    }

    fn relayout_full(&mut self) {
        self.tree = TreeView::reconstruct(&self.map);
        self.layout_stale = false;
        let update = self.layout.full_layout(&self.tree);
        self.adopt_positions(&update.moved);
    }

    /// Write computed positions back into the records they belong to, so
    /// the positions travel with the next delta.
    fn adopt_positions(&mut self, moved: &[NodeId]) {
        for id in moved {
            let Some(position) = self.layout.position_of(id) else {
                continue;
            };
            let updated = match self.map.get(id) {
                Some(record) if record.position != position => {
                    let mut record = record.clone();
                    record.position = position;
                    record
                }
                _ => continue,
            };
            self.map.set(id.clone(), updated);
        }
    }
}

/// An immutable view of a document for non-participants.
///
/// Holds a reconstructed tree and a copy of the live records; it never
/// joins the session and cannot write.
pub struct ReadOnlyView {
    tree: TreeView,
    records: BTreeMap<NodeId, NodeRecord>,
}

impl ReadOnlyView {
    pub fn of(document: &MindMap) -> Self {
        Self::from_snapshot(document.snapshot())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let map = NodeMap::from_snapshot(ReplicaId::new("read-only"), snapshot);
        let tree = TreeView::reconstruct(&map);
        let records = map
            .live()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        Self { tree, records }
    }

    /// Fetch the latest published snapshot of a document.
    pub async fn load(store: &dyn DocumentStore, id: &DocumentId) -> Result<Self> {
        let (snapshot, _) = store
            .load(id)
            .await
            .map_err(|e| SdkError::StoreError(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.tree.root()
    }

    pub fn tree(&self) -> &TreeView {
        &self.tree
    }

    pub fn children_of(&self, id: &NodeId) -> &[NodeId] {
        self.tree.children_of(id)
    }

    pub fn label_of(&self, id: &NodeId) -> Option<&str> {
        self.records.get(id).map(NodeRecord::display_label)
    }

    pub fn position_of(&self, id: &NodeId) -> Option<Position> {
        self.records.get(id).map(|record| record.position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
