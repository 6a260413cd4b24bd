//! Tree reconstruction - derive a validated logical tree from the flat map.
//!
//! Reconstruction is a pure function of the node-map state: two replicas
//! holding the same snapshot always derive the same tree. The anomalies it
//! resolves (multiple roots, orphans, cycles) are expected consequences of
//! eventual consistency, not errors, and are never surfaced as failures.
//!
//! Resolution policy:
//! - Canonical root: the parentless live node with the earliest
//!   `(created_at, id)` pair. Other parentless nodes become its children.
//! - Orphans: a node whose parent is tombstoned is rehomed to the nearest
//!   live ancestor along the tombstone chain; a node whose parent was never
//!   seen goes under the canonical root.
//! - Cycles: the member with the smallest write stamp is detached and
//!   reparented under the canonical root.

use crate::node::{NodeId, NodeRecord};
use crate::nodemap::NodeMap;
use std::collections::HashMap;

/// Bound on parent-chain walks. A chain longer than this can only mean
/// corrupted tombstone records; the walk falls back to the canonical root.
const MAX_CHAIN: usize = 10_000;

/// The validated logical tree derived from a node-map snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeView {
    root: Option<NodeId>,
    parents: HashMap<NodeId, NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    depths: HashMap<NodeId, usize>,
    subtree_sizes: HashMap<NodeId, usize>,
}

impl TreeView {
    /// Reconstruct the tree from the current map state.
    pub fn reconstruct(map: &NodeMap) -> Self {
        let live: Vec<(&NodeId, &NodeRecord)> = map.live().collect();
        if live.is_empty() {
            return Self::default();
        }

        let root = canonical_root(&live);

        // Resolve every node's effective parent.
        let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
        for &(id, record) in &live {
            if *id == root {
                continue;
            }
            let parent = resolve_parent(map, record, &root, id);
            parents.insert(id.clone(), parent);
        }

        break_cycles(map, &root, &mut parents);

        // Ordered adjacency: children sorted by (created_at, id).
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (child, parent) in &parents {
            children.entry(parent.clone()).or_default().push(child.clone());
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|id| {
                let created = map.get(id).map(|r| r.created_at).unwrap_or(0);
                (created, id.clone())
            });
        }

        let mut view = Self {
            root: Some(root),
            parents,
            children,
            depths: HashMap::new(),
            subtree_sizes: HashMap::new(),
        };
        view.compute_metrics();
        view
    }

    fn compute_metrics(&mut self) {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => return,
        };

        // Depths via BFS from the root.
        let mut queue = vec![(root.clone(), 0usize)];
        while let Some((id, depth)) = queue.pop() {
            self.depths.insert(id.clone(), depth);
            for child in self.children.get(&id).cloned().unwrap_or_default() {
                queue.push((child, depth + 1));
            }
        }

        // Subtree sizes via post-order accumulation (deepest first).
        let mut order: Vec<NodeId> = self.depths.keys().cloned().collect();
        order.sort_by_key(|id| std::cmp::Reverse(self.depths[id]));
        for id in order {
            let size: usize = 1 + self
                .children
                .get(&id)
                .map(|kids| kids.iter().map(|c| self.subtree_sizes[c]).sum::<usize>())
                .unwrap_or(0);
            self.subtree_sizes.insert(id, size);
        }
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.depths.contains_key(id)
    }

    /// Resolved parent, `None` for the root.
    pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.parents.get(id)
    }

    /// Children in deterministic `(created_at, id)` order.
    pub fn children_of(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn depth_of(&self, id: &NodeId) -> Option<usize> {
        self.depths.get(id).copied()
    }

    /// Node count of the subtree rooted at `id`, including `id` itself.
    pub fn subtree_size(&self, id: &NodeId) -> usize {
        self.subtree_sizes.get(id).copied().unwrap_or(0)
    }

    /// Whether `ancestor` lies on `node`'s resolved parent chain.
    pub fn is_ancestor(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let mut current = node;
        let mut hops = 0;
        while let Some(parent) = self.parents.get(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
            hops += 1;
            if hops > MAX_CHAIN {
                break;
            }
        }
        false
    }

    /// All ids in the subtree rooted at `id`, including `id`.
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !self.contains(&current) {
                continue;
            }
            for child in self.children_of(&current) {
                stack.push(child.clone());
            }
            out.push(current);
        }
        out
    }
}

/// The parentless live node with the earliest `(created_at, id)`. When every
/// live node claims a parent the earliest node overall stands in.
fn canonical_root(live: &[(&NodeId, &NodeRecord)]) -> NodeId {
    let parentless = live
        .iter()
        .filter(|(_, r)| r.parent.is_none())
        .min_by_key(|(id, r)| (r.created_at, (*id).clone()));
    match parentless {
        Some(&(id, _)) => id.clone(),
        None => {
            let &(id, _) = live
                .iter()
                .min_by_key(|(id, r)| (r.created_at, (*id).clone()))
                .expect("live is non-empty");
            id.clone()
        }
    }
}

/// Walk the recorded parent pointer to a live node, climbing through
/// tombstones, falling back to the canonical root.
fn resolve_parent(map: &NodeMap, record: &NodeRecord, root: &NodeId, this: &NodeId) -> NodeId {
    let mut current = match &record.parent {
        Some(parent) => parent.clone(),
        None => return root.clone(), // surplus root: reparent under canonical
    };
    let mut hops = 0;
    loop {
        if current == *this || current == *root {
            return root.clone();
        }
        if map.contains_live(&current) {
            return current;
        }
        // Tombstoned ancestor: climb through its last known parent.
        match map.last_record(&current).and_then(|r| r.parent.clone()) {
            Some(next) => current = next,
            None => return root.clone(), // missing or rootless tombstone
        }
        hops += 1;
        if hops > MAX_CHAIN {
            return root.clone();
        }
    }
}

/// Detach the smallest-stamp member of every parent cycle.
///
/// Each node has exactly one resolved parent, so cycles are disjoint; the
/// detached member is independent of traversal order.
fn break_cycles(map: &NodeMap, root: &NodeId, parents: &mut HashMap<NodeId, NodeId>) {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        InProgress,
        Done,
    }

    let ids: Vec<NodeId> = parents.keys().cloned().collect();
    let mut states: HashMap<NodeId, State> = HashMap::new();
    states.insert(root.clone(), State::Done);

    for start in ids {
        if states.contains_key(&start) {
            continue;
        }
        let mut path = Vec::new();
        let mut current = start.clone();
        loop {
            match states.get(&current) {
                Some(State::Done) => break,
                Some(State::InProgress) => {
                    // Found a cycle: everything in `path` from `current` on.
                    let cycle_start = path.iter().position(|id| *id == current).unwrap_or(0);
                    let cycle = &path[cycle_start..];
                    let detach = cycle
                        .iter()
                        .min_by_key(|id| map.stamp_of(id).cloned())
                        .expect("cycle is non-empty")
                        .clone();
                    parents.insert(detach, root.clone());
                    break;
                }
                None => {
                    states.insert(current.clone(), State::InProgress);
                    path.push(current.clone());
                    match parents.get(&current) {
                        Some(parent) => current = parent.clone(),
                        None => break, // reached the root
                    }
                }
            }
        }
        for id in path {
            states.insert(id, State::Done);
        }
    }
}
