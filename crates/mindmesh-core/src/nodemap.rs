//! Node-Map CRDT - last-writer-wins flat storage of node attributes.
//!
//! The map stores one versioned record per node id. Every write carries a
//! `WriteStamp`; merge keeps, per key, whichever of (local, remote) has the
//! greater stamp. Deletes are tombstones so that an id is never reused and a
//! late-arriving write for a deleted node still loses deterministically.
//!
//! Concurrent edits to different nodes never conflict. Concurrent edits to
//! the same node resolve whole-record (not per-field) - see the design notes
//! in DESIGN.md.

use crate::lattice::Lattice;
use crate::node::{NodeId, NodeRecord};
use crate::stamp::{ReplicaId, WriteStamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record slot: either live attributes or a tombstone.
///
/// Tombstones keep the final record so the tree reconstructor can rehome a
/// deleted node's stragglers under its former parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Slot {
    Live(NodeRecord),
    Tombstone(NodeRecord),
}

impl Slot {
    pub fn live(&self) -> Option<&NodeRecord> {
        match self {
            Slot::Live(record) => Some(record),
            Slot::Tombstone(_) => None,
        }
    }

    pub fn record(&self) -> &NodeRecord {
        match self {
            Slot::Live(record) | Slot::Tombstone(record) => record,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone(_))
    }
}

/// A stamped slot - the unit of replication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub stamp: WriteStamp,
    pub slot: Slot,
}

/// A partial (or full) set of versioned records, as carried on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDelta {
    pub records: BTreeMap<NodeId, Versioned>,
}

impl NodeDelta {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// The full current mapping, for persistence or reconstruction.
pub type Snapshot = NodeDelta;

/// The node-map CRDT for one replica of a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeMap {
    replica: ReplicaId,
    /// Lamport clock; bumped on local writes, advanced to max on merge.
    clock: u64,
    entries: BTreeMap<NodeId, Versioned>,
    /// Locally buffered writes not yet broadcast.
    #[serde(skip)]
    pending: BTreeMap<NodeId, Versioned>,
}

/// Converged state is the entry set; replica identity, clock and local
/// buffers are per-process bookkeeping.
impl PartialEq for NodeMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl NodeMap {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            clock: 0,
            entries: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn replica(&self) -> &ReplicaId {
        &self.replica
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    fn next_stamp(&mut self) -> WriteStamp {
        self.clock += 1;
        WriteStamp::new(self.clock, self.replica.clone())
    }

    /// Insert or overwrite a node's attributes under a fresh stamp.
    pub fn set(&mut self, id: NodeId, record: NodeRecord) -> WriteStamp {
        let stamp = self.next_stamp();
        let versioned = Versioned {
            stamp: stamp.clone(),
            slot: Slot::Live(record),
        };
        self.apply_local(id, versioned);
        stamp
    }

    /// Tombstone a node. The id is never reused; a no-op if unknown.
    pub fn delete(&mut self, id: &NodeId) -> Option<WriteStamp> {
        let last = self.entries.get(id)?.slot.record().clone();
        let stamp = self.next_stamp();
        let versioned = Versioned {
            stamp: stamp.clone(),
            slot: Slot::Tombstone(last),
        };
        self.apply_local(id.clone(), versioned);
        Some(stamp)
    }

    fn apply_local(&mut self, id: NodeId, versioned: Versioned) {
        self.pending.insert(id.clone(), versioned.clone());
        self.entries.insert(id, versioned);
    }

    /// Apply a remote delta, keeping the greater stamp per key.
    ///
    /// Commutative, associative, and idempotent: applying the same delta
    /// twice is a no-op. Returns the ids whose winning record changed.
    pub fn merge(&mut self, delta: &NodeDelta) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for (id, incoming) in &delta.records {
            self.clock = self.clock.max(incoming.stamp.clock);
            let keep_incoming = match self.entries.get(id) {
                Some(existing) => incoming.stamp > existing.stamp,
                None => true,
            };
            if keep_incoming {
                self.entries.insert(id.clone(), incoming.clone());
                changed.push(id.clone());
            }
        }
        changed
    }

    /// Take the locally buffered writes for broadcast.
    pub fn take_delta(&mut self) -> Option<NodeDelta> {
        if self.pending.is_empty() {
            return None;
        }
        Some(NodeDelta {
            records: std::mem::take(&mut self.pending),
        })
    }

    /// The full current mapping, tombstones included.
    pub fn snapshot(&self) -> Snapshot {
        NodeDelta {
            records: self.entries.clone(),
        }
    }

    /// Restore a replica from a persisted snapshot.
    pub fn from_snapshot(replica: ReplicaId, snapshot: Snapshot) -> Self {
        let mut map = Self::new(replica);
        map.merge(&snapshot);
        map.pending.clear();
        map
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.entries.get(id).and_then(|v| v.slot.live())
    }

    pub fn stamp_of(&self, id: &NodeId) -> Option<&WriteStamp> {
        self.entries.get(id).map(|v| &v.stamp)
    }

    /// The last known record for an id, even if tombstoned.
    pub fn last_record(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.entries.get(id).map(|v| v.slot.record())
    }

    pub fn is_deleted(&self, id: &NodeId) -> bool {
        self.entries
            .get(id)
            .map(|v| v.slot.is_tombstone())
            .unwrap_or(false)
    }

    pub fn contains_live(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate live (id, record) pairs in id order.
    pub fn live(&self) -> impl Iterator<Item = (&NodeId, &NodeRecord)> {
        self.entries
            .iter()
            .filter_map(|(id, v)| v.slot.live().map(|r| (id, r)))
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }
}

impl Lattice for NodeMap {
    fn bottom() -> Self {
        Self::new(ReplicaId::new(""))
    }

    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        joined.merge(&other.snapshot());
        joined.pending = self.pending.clone();
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn record(label: &str, parent: Option<&NodeId>) -> NodeRecord {
        NodeRecord::new(label, parent.cloned(), NodeKind::Detail)
    }

    fn map(replica: &str) -> NodeMap {
        NodeMap::new(ReplicaId::new(replica))
    }

    #[test]
    fn test_set_and_get() {
        let mut m = map("r1");
        let id = NodeId::new();
        m.set(id.clone(), record("hello", None));
        assert_eq!(m.get(&id).unwrap().label, "hello");
        assert_eq!(m.live_count(), 1);
    }

    #[test]
    fn test_delete_tombstones() {
        let mut m = map("r1");
        let id = NodeId::new();
        m.set(id.clone(), record("doomed", None));
        m.delete(&id);

        assert!(m.get(&id).is_none());
        assert!(m.is_deleted(&id));
        // Last record survives for orphan rehoming.
        assert_eq!(m.last_record(&id).unwrap().label, "doomed");
    }

    #[test]
    fn test_merge_higher_stamp_wins() {
        let id = NodeId::new();
        let mut a = map("a");
        let mut b = map("b");

        a.set(id.clone(), record("from-a", None));
        b.set(id.clone(), record("from-b-1", None));
        b.set(id.clone(), record("from-b-2", None)); // clock 2 on b

        let delta = b.take_delta().unwrap();
        a.merge(&delta);
        assert_eq!(a.get(&id).unwrap().label, "from-b-2");
    }

    #[test]
    fn test_merge_tie_breaks_on_replica_id() {
        // Same clock value on both sides: the greater replica id must win,
        // identically in both merge directions.
        let id = NodeId::new();
        let mut a = map("a");
        let mut b = map("b");
        a.set(id.clone(), record("X", None)); // stamp (1, "a")
        b.set(id.clone(), record("Y", None)); // stamp (1, "b")

        let delta_a = a.take_delta().unwrap();
        let delta_b = b.take_delta().unwrap();
        a.merge(&delta_b);
        b.merge(&delta_a);

        assert_eq!(a.get(&id).unwrap().label, "Y");
        assert_eq!(b.get(&id).unwrap().label, "Y");
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_idempotent() {
        let id = NodeId::new();
        let mut a = map("a");
        let mut b = map("b");
        b.set(id.clone(), record("v", None));
        let delta = b.take_delta().unwrap();

        a.merge(&delta);
        let once = a.snapshot();
        let changed = a.merge(&delta);
        assert!(changed.is_empty());
        assert_eq!(a.snapshot(), once);
    }

    #[test]
    fn test_merge_commutative() {
        let n1 = NodeId::new();
        let n2 = NodeId::new();
        let mut a = map("a");
        let mut b = map("b");
        a.set(n1, record("one", None));
        b.set(n2, record("two", None));

        let da = a.take_delta().unwrap();
        let db = b.take_delta().unwrap();

        let mut left = map("x");
        left.merge(&da);
        left.merge(&db);
        let mut right = map("y");
        right.merge(&db);
        right.merge(&da);
        assert_eq!(left, right);
    }

    #[test]
    fn test_delete_wins_only_with_greater_stamp() {
        let id = NodeId::new();
        let mut a = map("a");
        a.set(id.clone(), record("v1", None));
        let create = a.take_delta().unwrap();

        let mut b = NodeMap::from_snapshot(ReplicaId::new("b"), a.snapshot());
        b.delete(&id); // stamp (2, "b")
        let tombstone = b.take_delta().unwrap();

        // A concurrently rewrites at clock 2; "a" < "b" so the delete wins.
        a.set(id.clone(), record("v2", None));
        a.merge(&tombstone);
        assert!(a.is_deleted(&id));

        // But a later write (higher clock) resurfaces nothing: new ids are
        // required, and a fresh id is unaffected by the old tombstone.
        let _ = create;
        let fresh = NodeId::new();
        a.set(fresh.clone(), record("new", None));
        assert!(a.contains_live(&fresh));
    }

    #[test]
    fn test_clock_advances_past_merged_stamps() {
        let id = NodeId::new();
        let mut a = map("a");
        let mut b = map("b");
        for i in 0..5 {
            b.set(id.clone(), record(&format!("v{}", i), None));
        }
        a.merge(&b.take_delta().unwrap());

        // A's next local write must dominate everything it has seen.
        a.set(id.clone(), record("local", None));
        assert_eq!(a.get(&id).unwrap().label, "local");
        assert!(a.clock() > 5);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut a = map("a");
        let id = NodeId::new();
        a.set(id.clone(), record("persisted", None));

        let restored = NodeMap::from_snapshot(ReplicaId::new("b"), a.snapshot());
        assert_eq!(restored.get(&id).unwrap().label, "persisted");
        assert_eq!(restored, a);
    }
}
