//! Incremental layout driver.
//!
//! The engine caches each node's position together with the sector (radial)
//! or vertical band (tree) its subtree was laid out in. A structural edit
//! then only recomputes the affected parent's subtree inside its cached
//! region, leaving the rest of the canvas still.
//!
//! Incremental placement lets global proportionality go stale: a branch
//! that grew a lot still occupies the sector it was granted when it was
//! small. The engine tracks how much of the document has been placed this
//! way and schedules a full relayout once the fraction crosses
//! `LayoutConfig::drift_threshold`. Switching strategies always relayouts
//! fully.

use crate::radial;
use crate::spine;
use crate::{LayoutConfig, LayoutStrategy};
use mindmesh_core::node::{NodeId, Position};
use mindmesh_core::tree::TreeView;
use std::collections::HashMap;

/// A structural mutation the layout must react to.
#[derive(Clone, Debug)]
pub enum TreeEdit {
    /// A node was inserted under `parent`.
    Inserted { parent: NodeId },
    /// A node was removed; its slot under `former_parent` collapses.
    Removed { former_parent: NodeId },
    /// A node moved from `old_parent` to `new_parent`.
    Reparented {
        old_parent: NodeId,
        new_parent: NodeId,
    },
}

/// What a layout pass did.
#[derive(Clone, Debug, Default)]
pub struct LayoutUpdate {
    /// Ids whose position changed (or was first assigned).
    pub moved: Vec<NodeId>,
    /// Whether the whole document was relaid out.
    pub full: bool,
}

/// Per-document layout state.
#[derive(Clone, Debug)]
pub struct LayoutEngine {
    strategy: LayoutStrategy,
    config: LayoutConfig,
    positions: HashMap<NodeId, Position>,
    sectors: HashMap<NodeId, radial::Sector>,
    slots: HashMap<NodeId, spine::Slot>,
    /// Fraction of the document repositioned incrementally since the last
    /// full pass.
    drift: f64,
}

impl LayoutEngine {
    pub fn new(strategy: LayoutStrategy, config: LayoutConfig) -> Self {
        Self {
            strategy,
            config,
            positions: HashMap::new(),
            sectors: HashMap::new(),
            slots: HashMap::new(),
            drift: 0.0,
        }
    }

    pub fn strategy(&self) -> LayoutStrategy {
        self.strategy
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn position_of(&self, id: &NodeId) -> Option<Position> {
        self.positions.get(id).copied()
    }

    pub fn positions(&self) -> &HashMap<NodeId, Position> {
        &self.positions
    }

    /// Recompute every position from scratch and reset drift.
    pub fn full_layout(&mut self, tree: &TreeView) -> LayoutUpdate {
        self.positions.clear();
        self.sectors.clear();
        self.slots.clear();
        match self.strategy {
            LayoutStrategy::Radial => {
                radial::layout(tree, &self.config, &mut self.positions, &mut self.sectors)
            }
            LayoutStrategy::Tree => {
                spine::layout(tree, &self.config, &mut self.positions, &mut self.slots)
            }
        }
        self.drift = 0.0;
        LayoutUpdate {
            moved: self.positions.keys().cloned().collect(),
            full: true,
        }
    }

    /// Switch strategy; always relayouts fully.
    pub fn set_strategy(&mut self, strategy: LayoutStrategy, tree: &TreeView) -> LayoutUpdate {
        self.strategy = strategy;
        self.full_layout(tree)
    }

    /// React to one structural edit with a bounded incremental pass.
    pub fn apply(&mut self, tree: &TreeView, edit: &TreeEdit) -> LayoutUpdate {
        if self.positions.is_empty() {
            return self.full_layout(tree);
        }

        let parents: Vec<&NodeId> = match edit {
            TreeEdit::Inserted { parent } => vec![parent],
            TreeEdit::Removed { former_parent } => {
                self.prune(tree);
                vec![former_parent]
            }
            TreeEdit::Reparented {
                old_parent,
                new_parent,
            } => vec![old_parent, new_parent],
        };

        let mut moved = Vec::new();
        let mut touched = 0usize;
        for parent in parents {
            if !tree.contains(parent) {
                // The anchor itself is gone (e.g. removed together with its
                // subtree): local information is insufficient.
                return self.full_layout(tree);
            }
            match self.relayout_subtree(tree, parent) {
                Some(ids) => {
                    touched += ids.len();
                    moved.extend(ids);
                }
                None => return self.full_layout(tree),
            }
        }

        self.drift += touched as f64 / tree.len().max(1) as f64;
        if self.drift > self.config.drift_threshold {
            return self.full_layout(tree);
        }
        LayoutUpdate {
            moved,
            full: false,
        }
    }

    /// Relayout one subtree inside its cached region. `None` means the
    /// cache cannot anchor the pass and a full relayout is required.
    fn relayout_subtree(&mut self, tree: &TreeView, parent: &NodeId) -> Option<Vec<NodeId>> {
        match self.strategy {
            LayoutStrategy::Radial => {
                let sector = *self.sectors.get(parent)?;
                radial::layout_subtree(
                    tree,
                    &self.config,
                    parent,
                    sector,
                    &mut self.positions,
                    &mut self.sectors,
                );
            }
            LayoutStrategy::Tree => {
                let slot = *self.slots.get(parent)?;
                if slot.side == 0.0 {
                    // Root anchor: side alternation of its children may
                    // change, which is a whole-canvas concern.
                    return None;
                }
                spine::layout_subtree(
                    tree,
                    &self.config,
                    parent,
                    slot,
                    &mut self.positions,
                    &mut self.slots,
                );
            }
        }

        Some(tree.subtree_ids(parent))
    }

    /// Drop cached state for nodes no longer in the tree.
    fn prune(&mut self, tree: &TreeView) {
        self.positions.retain(|id, _| tree.contains(id));
        self.sectors.retain(|id, _| tree.contains(id));
        self.slots.retain(|id, _| tree.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmesh_core::node::{NodeKind, NodeRecord};
    use mindmesh_core::nodemap::NodeMap;
    use mindmesh_core::stamp::ReplicaId;

    fn record(parent: Option<&NodeId>, created_at: u64) -> NodeRecord {
        NodeRecord::new("n", parent.cloned(), NodeKind::Detail).with_created_at(created_at)
    }

    #[test]
    fn test_full_layout_covers_every_node() {
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        map.set(root.clone(), record(None, 1));
        for i in 0..5 {
            map.set(NodeId::new(), record(Some(&root), 2 + i));
        }
        let tree = TreeView::reconstruct(&map);

        let mut engine = LayoutEngine::new(LayoutStrategy::Radial, LayoutConfig::default());
        let update = engine.full_layout(&tree);
        assert!(update.full);
        assert_eq!(engine.positions().len(), 6);
    }

    #[test]
    fn test_insert_is_local_to_parent_subtree() {
        // Layout locality: a leaf under A must not move B or B's child.
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let b_kid = NodeId::new();
        map.set(root.clone(), record(None, 1));
        map.set(a.clone(), record(Some(&root), 2));
        map.set(b.clone(), record(Some(&root), 3));
        map.set(b_kid.clone(), record(Some(&b), 4));

        let mut engine = LayoutEngine::new(LayoutStrategy::Radial, LayoutConfig::default());
        engine.full_layout(&TreeView::reconstruct(&map));
        let b_before = engine.position_of(&b).unwrap();
        let b_kid_before = engine.position_of(&b_kid).unwrap();

        let leaf = NodeId::new();
        map.set(leaf.clone(), record(Some(&a), 5));
        let tree = TreeView::reconstruct(&map);
        let update = engine.apply(&tree, &TreeEdit::Inserted { parent: a.clone() });

        assert!(!update.full);
        assert!(engine.position_of(&leaf).is_some());
        assert_eq!(engine.position_of(&b).unwrap(), b_before);
        assert_eq!(engine.position_of(&b_kid).unwrap(), b_kid_before);
    }

    #[test]
    fn test_remove_collapses_slot_and_prunes() {
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        let a = NodeId::new();
        let gone = NodeId::new();
        map.set(root.clone(), record(None, 1));
        map.set(a.clone(), record(Some(&root), 2));
        map.set(gone.clone(), record(Some(&a), 3));

        let mut engine = LayoutEngine::new(LayoutStrategy::Radial, LayoutConfig::default());
        engine.full_layout(&TreeView::reconstruct(&map));
        assert!(engine.position_of(&gone).is_some());

        map.delete(&gone);
        let tree = TreeView::reconstruct(&map);
        engine.apply(
            &tree,
            &TreeEdit::Removed {
                former_parent: a.clone(),
            },
        );
        assert!(engine.position_of(&gone).is_none());
        assert!(engine.position_of(&a).is_some());
    }

    #[test]
    fn test_drift_triggers_full_relayout() {
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        let hub = NodeId::new();
        map.set(root.clone(), record(None, 1));
        map.set(hub.clone(), record(Some(&root), 2));

        let config = LayoutConfig {
            drift_threshold: 0.2,
            ..LayoutConfig::default()
        };
        let mut engine = LayoutEngine::new(LayoutStrategy::Radial, config);
        engine.full_layout(&TreeView::reconstruct(&map));

        // Keep inserting under the hub; drift accumulates until a pass
        // reports a full relayout.
        let mut saw_full = false;
        for i in 0..10 {
            map.set(NodeId::new(), record(Some(&hub), 10 + i));
            let tree = TreeView::reconstruct(&map);
            let update = engine.apply(&tree, &TreeEdit::Inserted { parent: hub.clone() });
            if update.full {
                saw_full = true;
                break;
            }
        }
        assert!(saw_full);
    }

    #[test]
    fn test_strategy_switch_is_full_relayout() {
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        map.set(root.clone(), record(None, 1));
        map.set(NodeId::new(), record(Some(&root), 2));
        let tree = TreeView::reconstruct(&map);

        let mut engine = LayoutEngine::new(LayoutStrategy::Radial, LayoutConfig::default());
        engine.full_layout(&tree);
        let update = engine.set_strategy(LayoutStrategy::Tree, &tree);
        assert!(update.full);
        assert_eq!(engine.strategy(), LayoutStrategy::Tree);
    }

    #[test]
    fn test_replicas_converge_on_layout_without_coordination() {
        // Same tree shape on two engines: identical positions.
        let mut map = NodeMap::new(ReplicaId::new("r"));
        let root = NodeId::new();
        let a = NodeId::new();
        map.set(root.clone(), record(None, 1));
        map.set(a.clone(), record(Some(&root), 2));
        map.set(NodeId::new(), record(Some(&a), 3));
        let tree = TreeView::reconstruct(&map);

        let mut e1 = LayoutEngine::new(LayoutStrategy::Tree, LayoutConfig::default());
        let mut e2 = LayoutEngine::new(LayoutStrategy::Tree, LayoutConfig::default());
        e1.full_layout(&tree);
        e2.full_layout(&tree);
        assert_eq!(e1.positions(), e2.positions());
    }
}
