//! Layout engine for Mindmesh documents.
//!
//! Assigns (x, y) canvas positions to every node of a reconstructed tree.
//! Two strategies are available per document:
//!
//! - [`LayoutStrategy::Radial`]: root at the canvas origin, depth levels on
//!   concentric rings, sibling sectors proportional to subtree size.
//! - [`LayoutStrategy::Tree`]: a bidirectional tree - children fan out left
//!   and right of a vertical spine, depth maps to horizontal distance.
//!
//! Both strategies are deterministic: the same tree shape always produces
//! the same positions, so replicas converge on layout without synchronizing
//! positions explicitly. Structural edits are repositioned incrementally,
//! bounded to the affected parent's subtree; a full relayout runs only on
//! strategy switches or once accumulated drift crosses the configured
//! threshold.

mod engine;
mod radial;
mod spine;

pub use engine::{LayoutEngine, LayoutUpdate, TreeEdit};

use serde::{Deserialize, Serialize};

/// Which layout algorithm a document uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutStrategy {
    /// Concentric rings around the root.
    #[default]
    Radial,
    /// Bidirectional horizontal tree.
    Tree,
}

/// Geometry knobs shared by both strategies.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Radius increment per depth level (radial).
    pub ring_gap: f64,
    /// Horizontal distance per depth level (tree).
    pub level_gap: f64,
    /// Minimum vertical clearance between siblings (tree).
    pub clearance: f64,
    /// Fraction of the document that may be repositioned incrementally
    /// before a full relayout restores global proportionality.
    pub drift_threshold: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ring_gap: 160.0,
            level_gap: 180.0,
            clearance: 48.0,
            drift_threshold: 0.35,
        }
    }
}
