//! Error types for the Mindmesh SDK.

use mindmesh_core::CoreError;
use std::fmt;

/// Error type for SDK operations.
#[derive(Debug)]
pub enum SdkError {
    /// A structural edit was rejected by the document model.
    Edit(CoreError),
    /// Saving lost the optimistic-concurrency race too many times.
    VersionConflict { document: String, attempts: u32 },
    /// Persistence backend failure.
    StoreError(String),
    /// Transport failure.
    NetworkError(String),
    /// Serialization error.
    SerializationError(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::Edit(e) => write!(f, "Edit rejected: {}", e),
            SdkError::VersionConflict { document, attempts } => write!(
                f,
                "Version conflict on document {} after {} attempts",
                document, attempts
            ),
            SdkError::StoreError(e) => write!(f, "Store error: {}", e),
            SdkError::NetworkError(e) => write!(f, "Network error: {}", e),
            SdkError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            SdkError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for SdkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdkError::Edit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoreError> for SdkError {
    fn from(e: CoreError) -> Self {
        SdkError::Edit(e)
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
