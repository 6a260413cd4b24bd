//! Persistence boundary for mind-map documents.
//!
//! A [`DocumentStore`] saves whole snapshots under an optimistic version
//! counter: every successful save bumps the version, and a save against a
//! stale version is rejected so the caller can merge and retry. Merging a
//! loaded snapshot is always safe, so the retry loop converges instead of
//! clobbering concurrent writers.

use crate::document::DocumentId;
use async_trait::async_trait;
use mindmesh_core::nodemap::Snapshot;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistence error type.
#[derive(Clone, Debug)]
pub enum StoreError {
    /// The document changed since it was loaded.
    VersionConflict { expected: u64, found: u64 },
    /// No document under that id.
    NotFound(String),
    /// Backend failure (I/O, encoding, ...).
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::VersionConflict { expected, found } => {
                write!(f, "Version conflict: expected {}, found {}", expected, found)
            }
            StoreError::NotFound(id) => write!(f, "Document not found: {}", id),
            StoreError::Backend(e) => write!(f, "Backend error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Abstract snapshot store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist `snapshot` if the stored version still equals
    /// `expected_version`. Returns the new version on success. A document
    /// that does not exist yet has version 0.
    async fn save(
        &self,
        id: &DocumentId,
        snapshot: &Snapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Load the latest snapshot and its version.
    async fn load(&self, id: &DocumentId) -> Result<(Snapshot, u64), StoreError>;

    /// Whether a document exists.
    async fn contains(&self, id: &DocumentId) -> bool;
}

/// In-memory store for tests and simulations. Snapshots are kept as JSON
/// so the round trip exercises the same encoding a file or network backend
/// would use.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentId, (Vec<u8>, u64)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save(
        &self,
        id: &DocumentId,
        snapshot: &Snapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let encoded =
            serde_json::to_vec(snapshot).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut documents = self.documents.write();
        let current = documents.get(id).map(|(_, v)| *v).unwrap_or(0);
        if current != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: current,
            });
        }
        let next = current + 1;
        documents.insert(id.clone(), (encoded, next));
        Ok(next)
    }

    async fn load(&self, id: &DocumentId) -> Result<(Snapshot, u64), StoreError> {
        let documents = self.documents.read();
        let (encoded, version) = documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let snapshot =
            serde_json::from_slice(encoded).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok((snapshot, *version))
    }

    async fn contains(&self, id: &DocumentId) -> bool {
        self.documents.read().contains_key(id)
    }
}
