//! Write stamps - the (logical clock, replica id) tuples that total-order
//! concurrent writes.
//!
//! Every write to the node map carries a stamp. A stamp with a higher clock
//! wins; on a clock tie, the lexicographically greater replica id wins. The
//! derived `Ord` on `(clock, replica)` gives every pair of concurrent writes
//! a deterministic winner on every replica.

use serde::{Deserialize, Serialize};

/// Identifier for a replica of a document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A totally ordered write timestamp.
///
/// Field order matters: `Ord` is derived, so comparison is by `clock` first
/// and `replica` second.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriteStamp {
    /// Lamport clock value at the time of the write.
    pub clock: u64,
    /// The replica that performed the write (tie-breaker).
    pub replica: ReplicaId,
}

impl WriteStamp {
    pub fn new(clock: u64, replica: ReplicaId) -> Self {
        Self { clock, replica }
    }
}
