//! Bidirectional tree layout - children fan out left and right of the root.
//!
//! The root anchors a vertical spine at the origin. Its children alternate
//! right/left by sibling order; every deeper level moves `level_gap` further
//! out horizontally. Vertical space is allocated post-order: a subtree's
//! height is the sum of its children's heights, floored at the sibling
//! clearance, so a tall branch pushes its neighbours apart instead of
//! overlapping them.

use crate::LayoutConfig;
use mindmesh_core::node::{NodeId, Position};
use mindmesh_core::tree::TreeView;
use std::collections::HashMap;

/// The vertical band assigned to a node's subtree on one side of the spine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Slot {
    /// -1.0 for left of the spine, 1.0 for right, 0.0 for the root itself.
    pub side: f64,
    pub y_top: f64,
    pub height: f64,
}

impl Slot {
    fn center(&self) -> f64 {
        self.y_top + self.height / 2.0
    }
}

/// Natural height of a subtree: children stack, leaves take one clearance.
pub(crate) fn subtree_height(tree: &TreeView, node: &NodeId, config: &LayoutConfig) -> f64 {
    let children = tree.children_of(node);
    if children.is_empty() {
        return config.clearance;
    }
    let stacked: f64 = children
        .iter()
        .map(|c| subtree_height(tree, c, config))
        .sum();
    stacked.max(config.clearance)
}

/// Lay out the whole tree from scratch.
pub(crate) fn layout(
    tree: &TreeView,
    config: &LayoutConfig,
    positions: &mut HashMap<NodeId, Position>,
    slots: &mut HashMap<NodeId, Slot>,
) {
    let root = match tree.root() {
        Some(root) => root.clone(),
        None => return,
    };

    positions.insert(root.clone(), Position::ORIGIN);

    // Split the root's children across the two sides, alternating by
    // sibling order so both flanks stay balanced.
    let children = tree.children_of(&root);
    let mut right: Vec<&NodeId> = Vec::new();
    let mut left: Vec<&NodeId> = Vec::new();
    for (i, child) in children.iter().enumerate() {
        if i % 2 == 0 {
            right.push(child);
        } else {
            left.push(child);
        }
    }

    let mut total_height = 0.0f64;
    for side_children in [&right, &left] {
        let side_height: f64 = side_children
            .iter()
            .map(|c| subtree_height(tree, c, config))
            .sum();
        total_height = total_height.max(side_height);
    }
    slots.insert(
        root.clone(),
        Slot {
            side: 0.0,
            y_top: -total_height / 2.0,
            height: total_height,
        },
    );

    for (side, side_children) in [(1.0f64, right), (-1.0f64, left)] {
        let block: f64 = side_children
            .iter()
            .map(|c| subtree_height(tree, c, config))
            .sum();
        let mut y = -block / 2.0;
        for child in side_children {
            let height = subtree_height(tree, child, config);
            layout_subtree(
                tree,
                config,
                child,
                Slot {
                    side,
                    y_top: y,
                    height,
                },
                positions,
                slots,
            );
            y += height;
        }
    }
}

/// Reposition `node` and its subtree inside `slot`. Siblings outside the
/// slot are untouched. If the subtree has outgrown the slot (incremental
/// inserts), the bands compress; the engine's drift counter ensures a full
/// relayout restores the clearance before long.
pub(crate) fn layout_subtree(
    tree: &TreeView,
    config: &LayoutConfig,
    node: &NodeId,
    slot: Slot,
    positions: &mut HashMap<NodeId, Position>,
    slots: &mut HashMap<NodeId, Slot>,
) {
    let depth = tree.depth_of(node).unwrap_or(0);
    positions.insert(
        node.clone(),
        Position::new(slot.side * config.level_gap * depth as f64, slot.center()),
    );
    slots.insert(node.clone(), slot);

    let children = tree.children_of(node);
    if children.is_empty() {
        return;
    }

    let natural: f64 = children
        .iter()
        .map(|c| subtree_height(tree, c, config))
        .sum();
    let scale = if natural > slot.height && natural > 0.0 {
        slot.height / natural
    } else {
        1.0
    };

    // Center the stacked children inside the slot.
    let block = natural * scale;
    let mut y = slot.y_top + (slot.height - block) / 2.0;
    for child in children {
        let height = subtree_height(tree, child, config) * scale;
        layout_subtree(
            tree,
            config,
            child,
            Slot {
                side: slot.side,
                y_top: y,
                height,
            },
            positions,
            slots,
        );
        y += height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmesh_core::node::{NodeKind, NodeRecord};
    use mindmesh_core::nodemap::NodeMap;
    use mindmesh_core::stamp::ReplicaId;

    fn build_tree(edges: &[(&NodeId, Option<&NodeId>, u64)]) -> TreeView {
        let mut map = NodeMap::new(ReplicaId::new("test"));
        for (id, parent, created) in edges {
            map.set(
                (*id).clone(),
                NodeRecord::new("n", parent.map(|p| p.clone()), NodeKind::Detail)
                    .with_created_at(*created),
            );
        }
        TreeView::reconstruct(&map)
    }

    #[test]
    fn test_children_alternate_sides() {
        let r = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();
        let tree = build_tree(&[
            (&r, None, 1),
            (&a, Some(&r), 2),
            (&b, Some(&r), 3),
            (&c, Some(&r), 4),
        ]);
        let config = LayoutConfig::default();
        let mut positions = HashMap::new();
        let mut slots = HashMap::new();
        layout(&tree, &config, &mut positions, &mut slots);

        // First and third child right, second left.
        assert!(positions[&a].x > 0.0);
        assert!(positions[&b].x < 0.0);
        assert!(positions[&c].x > 0.0);
        assert_eq!(positions[&r], Position::ORIGIN);
    }

    #[test]
    fn test_depth_maps_to_horizontal_distance() {
        let r = NodeId::new();
        let a = NodeId::new();
        let g = NodeId::new();
        let tree = build_tree(&[(&r, None, 1), (&a, Some(&r), 2), (&g, Some(&a), 3)]);
        let config = LayoutConfig::default();
        let mut positions = HashMap::new();
        let mut slots = HashMap::new();
        layout(&tree, &config, &mut positions, &mut slots);

        assert!((positions[&a].x - config.level_gap).abs() < 1e-9);
        assert!((positions[&g].x - config.level_gap * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_siblings_keep_minimum_clearance() {
        let r = NodeId::new();
        let a = NodeId::new();
        let kids: Vec<NodeId> = (0..4).map(|_| NodeId::new()).collect();
        let mut edges = vec![(&r, None, 1), (&a, Some(&r), 2)];
        for (i, kid) in kids.iter().enumerate() {
            edges.push((kid, Some(&a), 3 + i as u64));
        }
        let tree = build_tree(&edges);
        let config = LayoutConfig::default();
        let mut positions = HashMap::new();
        let mut slots = HashMap::new();
        layout(&tree, &config, &mut positions, &mut slots);

        let mut ys: Vec<f64> = kids.iter().map(|k| positions[k].y).collect();
        ys.sort_by(|p, q| p.partial_cmp(q).unwrap());
        for pair in ys.windows(2) {
            assert!(pair[1] - pair[0] >= config.clearance - 1e-9);
        }
    }

    #[test]
    fn test_tall_subtree_pushes_siblings_apart() {
        // b has three children, so a and c must sit further from b than the
        // bare clearance would put them.
        let r = NodeId::new();
        let side: Vec<NodeId> = (0..3).map(|_| NodeId::new()).collect();
        let grand: Vec<NodeId> = (0..3).map(|_| NodeId::new()).collect();
        // All on one side: only odd indices go left, so use every other child.
        let mut edges = vec![(&r, None, 1)];
        for (i, n) in side.iter().enumerate() {
            edges.push((n, Some(&r), 2 + i as u64));
        }
        for (i, g) in grand.iter().enumerate() {
            edges.push((g, Some(&side[2]), 10 + i as u64));
        }
        let tree = build_tree(&edges);
        let config = LayoutConfig::default();
        let mut positions = HashMap::new();
        let mut slots = HashMap::new();
        layout(&tree, &config, &mut positions, &mut slots);

        // side[0] and side[2] are both on the right; side[2]'s subtree is
        // three clearances tall so their centers are at least two apart.
        let gap = (positions[&side[0]].y - positions[&side[2]].y).abs();
        assert!(gap >= config.clearance * 2.0 - 1e-9);
    }

    #[test]
    fn test_subtree_relayout_leaves_other_side_untouched() {
        let r = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let leaf = NodeId::new();
        let tree = build_tree(&[
            (&r, None, 1),
            (&a, Some(&r), 2),
            (&b, Some(&r), 3),
            (&leaf, Some(&a), 4),
        ]);
        let config = LayoutConfig::default();
        let mut positions = HashMap::new();
        let mut slots = HashMap::new();
        layout(&tree, &config, &mut positions, &mut slots);

        let b_before = positions[&b];
        let a_slot = slots[&a];
        layout_subtree(&tree, &config, &a, a_slot, &mut positions, &mut slots);
        assert_eq!(positions[&b], b_before);
    }
}
