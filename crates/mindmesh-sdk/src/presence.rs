//! Editing presence for collaborative mind maps.
//!
//! Tracks which participant is editing which node. Claims are advisory:
//! they never block a concurrent write, they only drive the "someone is
//! editing this" indicator in a client. A claim stays alive as long as its
//! participant heartbeats; a participant that disappears without releasing
//! (crash, dropped connection) ages out after [`PresenceTracker::timeout_ms`].
//!
//! Expiry is enforced twice: lazily on every read (expired claims are
//! skipped) and eagerly by [`PresenceTracker::sweep`], which a session runs
//! on an interval to keep the table from accumulating dead entries.

use crate::clock::Clock;
use mindmesh_core::node::NodeId;
use mindmesh_core::tree::TreeView;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Unique identifier for a session participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default claim timeout: a participant silent for this long is gone.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Tracks editing claims for one document.
pub struct PresenceTracker {
    /// (node, participant) -> last heartbeat in clock milliseconds.
    claims: HashMap<(NodeId, ParticipantId), u64>,
    timeout_ms: u64,
    clock: Arc<dyn Clock>,
}

impl PresenceTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            claims: HashMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            clock,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Record that `participant` started editing `node`.
    ///
    /// Multiple participants may claim the same node at once; the claim is
    /// a signal, not a lock.
    pub fn acquire(&mut self, node: NodeId, participant: ParticipantId) {
        let now = self.clock.now_millis();
        self.claims.insert((node, participant), now);
    }

    /// Drop `participant`'s claim on `node`, if any.
    pub fn release(&mut self, node: &NodeId, participant: &ParticipantId) {
        self.claims.remove(&(node.clone(), participant.clone()));
    }

    /// Refresh every live claim held by `participant`. A claim already past
    /// the timeout stays expired; picking the node back up takes a fresh
    /// `acquire`.
    pub fn heartbeat(&mut self, participant: &ParticipantId) {
        let now = self.clock.now_millis();
        let timeout = self.timeout_ms;
        for ((_, holder), at) in self.claims.iter_mut() {
            if holder == participant && now.saturating_sub(*at) <= timeout {
                *at = now;
            }
        }
    }

    /// Apply a claim observed from a remote participant, stamped at the
    /// local clock. Remote clocks are never compared against ours.
    pub fn apply_remote_claim(&mut self, node: NodeId, participant: ParticipantId) {
        self.acquire(node, participant);
    }

    fn is_live(&self, claimed_at: u64, now: u64) -> bool {
        now.saturating_sub(claimed_at) <= self.timeout_ms
    }

    /// Participants currently editing `node`. Expired claims are skipped
    /// without waiting for a sweep. Sorted for deterministic display.
    pub fn active_editors(&self, node: &NodeId) -> Vec<ParticipantId> {
        let now = self.clock.now_millis();
        let mut editors: Vec<ParticipantId> = self
            .claims
            .iter()
            .filter(|((n, _), at)| n == node && self.is_live(**at, now))
            .map(|((_, p), _)| p.clone())
            .collect();
        editors.sort();
        editors
    }

    /// Whether any live claim exists on `node`.
    pub fn is_claimed(&self, node: &NodeId) -> bool {
        let now = self.clock.now_millis();
        self.claims
            .iter()
            .any(|((n, _), at)| n == node && self.is_live(*at, now))
    }

    /// Nodes `participant` currently claims. Used to rebroadcast claims on
    /// each heartbeat tick.
    pub fn claims_of(&self, participant: &ParticipantId) -> Vec<NodeId> {
        let now = self.clock.now_millis();
        let mut nodes: Vec<NodeId> = self
            .claims
            .iter()
            .filter(|((_, p), at)| p == participant && self.is_live(**at, now))
            .map(|((n, _), _)| n.clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Remove every expired claim, returning what was dropped.
    pub fn sweep(&mut self) -> Vec<(NodeId, ParticipantId)> {
        let now = self.clock.now_millis();
        let timeout = self.timeout_ms;
        let mut expired = Vec::new();
        self.claims.retain(|key, at| {
            if now.saturating_sub(*at) > timeout {
                expired.push(key.clone());
                false
            } else {
                true
            }
        });
        expired.sort();
        expired
    }

    /// Drop claims on nodes that no longer exist in the tree.
    pub fn prune_missing(&mut self, tree: &TreeView) {
        self.claims.retain(|(node, _), _| tree.contains(node));
    }

    /// Total claims in the table, expired ones included.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
