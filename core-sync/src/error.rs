use thiserror::Error;

/// Errors surfaced by the importer and the sync service.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] core_source::SourceError),

    #[error(transparent)]
    Library(#[from] core_library::LibraryError),

    /// Manifest parse failure. Terminal; retrying cannot produce a
    /// different document.
    #[error("corrupt manifest {name}: {message}")]
    CorruptManifest { name: String, message: String },

    #[error("sync cancelled")]
    Cancelled,

    #[error("library not found: {0}")]
    LibraryNotFound(String),
}

impl SyncError {
    pub fn corrupt_manifest(name: &str, e: serde_json::Error) -> Self {
        SyncError::CorruptManifest {
            name: name.to_string(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
