//! Radial layout - concentric rings with subtree-proportional sectors.
//!
//! The root sits at the canvas origin and owns the full circle. Each node's
//! angular sector is subdivided among its children in proportion to their
//! subtree sizes, so crowded branches get more angular room. A node is
//! placed at the midpoint angle of its sector, on the ring for its depth.

use crate::LayoutConfig;
use mindmesh_core::node::{NodeId, Position};
use mindmesh_core::tree::TreeView;
use std::collections::HashMap;
use std::f64::consts::TAU;

/// The angular wedge assigned to a node's subtree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Sector {
    pub start: f64,
    pub span: f64,
}

impl Sector {
    pub(crate) const FULL: Sector = Sector {
        start: 0.0,
        span: TAU,
    };

    pub(crate) fn mid(&self) -> f64 {
        self.start + self.span / 2.0
    }
}

/// Lay out the whole tree from scratch.
pub(crate) fn layout(
    tree: &TreeView,
    config: &LayoutConfig,
    positions: &mut HashMap<NodeId, Position>,
    sectors: &mut HashMap<NodeId, Sector>,
) {
    let root = match tree.root() {
        Some(root) => root.clone(),
        None => return,
    };
    layout_subtree(tree, config, &root, Sector::FULL, positions, sectors);
}

/// Reposition `node` and everything below it inside `sector`.
///
/// Nothing outside the subtree is touched, which is what bounds the cost of
/// incremental relayout to the affected branch.
pub(crate) fn layout_subtree(
    tree: &TreeView,
    config: &LayoutConfig,
    node: &NodeId,
    sector: Sector,
    positions: &mut HashMap<NodeId, Position>,
    sectors: &mut HashMap<NodeId, Sector>,
) {
    let depth = tree.depth_of(node).unwrap_or(0);
    let radius = config.ring_gap * depth as f64;
    let angle = sector.mid();
    positions.insert(
        node.clone(),
        Position::new(radius * angle.cos(), radius * angle.sin()),
    );
    sectors.insert(node.clone(), sector);

    let children = tree.children_of(node);
    if children.is_empty() {
        return;
    }

    let total_weight: usize = children.iter().map(|c| tree.subtree_size(c)).sum();
    let mut cursor = sector.start;
    for child in children {
        let weight = tree.subtree_size(child).max(1);
        let span = if total_weight > 0 {
            sector.span * weight as f64 / total_weight as f64
        } else {
            sector.span / children.len() as f64
        };
        let child_sector = Sector {
            start: cursor,
            span,
        };
        layout_subtree(tree, config, child, child_sector, positions, sectors);
        cursor += span;
    }
}
