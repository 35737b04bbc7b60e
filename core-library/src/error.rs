use thiserror::Error;

/// Errors surfaced by the library store.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("library not found: {0}")]
    LibraryNotFound(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
