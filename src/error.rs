//! History engine error types.

use thiserror::Error;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors returned by the history engine. Each kind has a distinct
/// recovery action for the caller: pick another version, reload the
/// document, or retry against the store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The live document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The requested version is not in the document's log.
    #[error("Version not found: {version_id} (document {document_id})")]
    VersionNotFound {
        document_id: String,
        version_id: String,
    },

    /// The live document changed underneath an operation, e.g. it was
    /// deleted while a restore was in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backing store failed. Not retried here.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// A stored row could not be decoded.
    #[error("Stored data corrupted: {0}")]
    Corrupted(String),

    /// The caller supplied something that is not a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HistoryError {
    pub fn version_not_found(document_id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self::VersionNotFound {
            document_id: document_id.into(),
            version_id: version_id.into(),
        }
    }

    pub(crate) fn lock_poisoned(kind: &str) -> Self {
        Self::StoreUnavailable(anyhow::anyhow!("Failed to acquire {} lock", kind))
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreUnavailable(e.into())
    }
}

impl From<rusqlite_migration::Error> for HistoryError {
    fn from(e: rusqlite_migration::Error) -> Self {
        Self::StoreUnavailable(e.into())
    }
}

impl From<serde_rusqlite::Error> for HistoryError {
    fn from(e: serde_rusqlite::Error) -> Self {
        match e {
            // Rows are stepped lazily while decoding, so SQLite failures
            // surface here too.
            serde_rusqlite::Error::Rusqlite(e) => Self::StoreUnavailable(e.into()),
            other => Self::Corrupted(other.to_string()),
        }
    }
}
