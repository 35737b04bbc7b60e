//! Library repository: CRUD for the library rows that anchor every mirror.

use crate::error::{LibraryError, Result};
use crate::models::{Library, SyncOutcome};
use async_trait::async_trait;
use core_source::{BackendKind, SourceDescriptor};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

/// Data access for library rows.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn insert(&self, library: &Library) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Library>>;

    /// All libraries, most recently created first.
    async fn list(&self) -> Result<Vec<Library>>;

    async fn rename(&self, id: &str, name: &str) -> Result<()>;

    async fn set_use_local_cache(&self, id: &str, use_local_cache: bool) -> Result<()>;

    /// Delete a library; folders, items, and memberships cascade.
    ///
    /// Returns true if a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, FromRow)]
struct LibraryRow {
    id: String,
    name: String,
    backend: String,
    locator: String,
    use_local_cache: bool,
    folder_cursor: i64,
    item_cursor: i64,
    last_sync: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<LibraryRow> for Library {
    type Error = LibraryError;

    fn try_from(row: LibraryRow) -> Result<Library> {
        let backend = BackendKind::parse(&row.backend)
            .ok_or_else(|| LibraryError::InvalidData(format!("unknown backend: {}", row.backend)))?;
        let last_sync = SyncOutcome::parse(&row.last_sync).ok_or_else(|| {
            LibraryError::InvalidData(format!("unknown sync outcome: {}", row.last_sync))
        })?;
        Ok(Library {
            id: row.id,
            name: row.name,
            source: SourceDescriptor::new(backend, row.locator),
            use_local_cache: row.use_local_cache,
            folder_cursor: row.folder_cursor,
            item_cursor: row.item_cursor,
            last_sync,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// SQLite-backed [`LibraryRepository`].
pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    async fn insert(&self, library: &Library) -> Result<()> {
        library.validate().map_err(LibraryError::InvalidData)?;

        sqlx::query(
            r#"
            INSERT INTO libraries (id, name, backend, locator, use_local_cache,
                folder_cursor, item_cursor, last_sync, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&library.id)
        .bind(&library.name)
        .bind(library.source.backend.as_str())
        .bind(&library.source.locator)
        .bind(library.use_local_cache)
        .bind(library.folder_cursor)
        .bind(library.item_cursor)
        .bind(library.last_sync.as_str())
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&self.pool)
        .await?;

        info!(library_id = %library.id, name = %library.name, "library created");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Library>> {
        let row: Option<LibraryRow> = sqlx::query_as("SELECT * FROM libraries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Library::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Library>> {
        let rows: Vec<LibraryRow> =
            sqlx::query_as("SELECT * FROM libraries ORDER BY created_at DESC, id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Library::try_from).collect()
    }

    async fn rename(&self, id: &str, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(LibraryError::InvalidData(
                "library name must not be empty".to_string(),
            ));
        }
        let result = sqlx::query("UPDATE libraries SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::LibraryNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_use_local_cache(&self, id: &str, use_local_cache: bool) -> Result<()> {
        let result =
            sqlx::query("UPDATE libraries SET use_local_cache = ?, updated_at = ? WHERE id = ?")
                .bind(use_local_cache)
                .bind(chrono::Utc::now().timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::LibraryNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(library_id = %id, "library deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn sample() -> Library {
        Library::new(
            "Photos",
            SourceDescriptor::new(BackendKind::GoogleDrive, "root-folder-id"),
            true,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteLibraryRepository::new(pool);
        let library = sample();

        repo.insert(&library).await.unwrap();
        let found = repo.find_by_id(&library.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Photos");
        assert_eq!(found.source.backend, BackendKind::GoogleDrive);
        assert_eq!(found.source.locator, "root-folder-id");
        assert_eq!(found.last_sync, SyncOutcome::None);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteLibraryRepository::new(pool);
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_and_toggle_cache() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteLibraryRepository::new(pool);
        let library = sample();
        repo.insert(&library).await.unwrap();

        repo.rename(&library.id, "Archive").await.unwrap();
        repo.set_use_local_cache(&library.id, false).await.unwrap();

        let found = repo.find_by_id(&library.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Archive");
        assert!(!found.use_local_cache);
    }

    #[tokio::test]
    async fn test_rename_missing_library_errors() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteLibraryRepository::new(pool);
        let result = repo.rename("nope", "Anything").await;
        assert!(matches!(result, Err(LibraryError::LibraryNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_returns_whether_removed() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteLibraryRepository::new(pool);
        let library = sample();
        repo.insert(&library).await.unwrap();

        assert!(repo.delete(&library.id).await.unwrap());
        assert!(!repo.delete(&library.id).await.unwrap());
    }
}
