//! Folder repository: tree reads plus the sort-preference override, the one
//! interactive write the importer must never undo.

use crate::error::{LibraryError, Result};
use crate::models::{Folder, SortType};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn find_by_id(&self, library_id: &str, folder_id: &str) -> Result<Option<Folder>>;

    /// All folders of a library in manual order.
    async fn list(&self, library_id: &str) -> Result<Vec<Folder>>;

    /// Direct children of a parent (None for roots), in manual order.
    async fn list_children(
        &self,
        library_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Folder>>;

    /// Override a folder's sort preference.
    ///
    /// Marks the folder as user-modified so subsequent imports keep the
    /// override.
    async fn set_sort_preference(
        &self,
        library_id: &str,
        folder_id: &str,
        sort_type: SortType,
        ascending: bool,
    ) -> Result<()>;

    /// Resolve the item shown as the folder's cover.
    ///
    /// The explicit cover wins when it still exists; otherwise the first
    /// member by order value. None for an empty folder.
    async fn find_cover_item(&self, library_id: &str, folder_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, FromRow)]
struct FolderRow {
    library_id: String,
    folder_id: String,
    parent_id: Option<String>,
    name: String,
    normalized_name: String,
    modified_at: i64,
    order_index: i64,
    cover_id: Option<String>,
    sort_type: String,
    sort_ascending: bool,
    sort_modified: bool,
}

impl TryFrom<FolderRow> for Folder {
    type Error = LibraryError;

    fn try_from(row: FolderRow) -> Result<Folder> {
        let sort_type = SortType::parse(&row.sort_type).ok_or_else(|| {
            LibraryError::InvalidData(format!("unknown sort type: {}", row.sort_type))
        })?;
        Ok(Folder {
            library_id: row.library_id,
            folder_id: row.folder_id,
            parent_id: row.parent_id,
            name: row.name,
            normalized_name: row.normalized_name,
            modified_at: row.modified_at,
            order_index: row.order_index,
            cover_id: row.cover_id,
            sort_type,
            sort_ascending: row.sort_ascending,
            sort_modified: row.sort_modified,
        })
    }
}

/// SQLite-backed [`FolderRepository`].
pub struct SqliteFolderRepository {
    pool: SqlitePool,
}

impl SqliteFolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FolderRepository for SqliteFolderRepository {
    async fn find_by_id(&self, library_id: &str, folder_id: &str) -> Result<Option<Folder>> {
        let row: Option<FolderRow> =
            sqlx::query_as("SELECT * FROM folders WHERE library_id = ? AND folder_id = ?")
                .bind(library_id)
                .bind(folder_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Folder::try_from).transpose()
    }

    async fn list(&self, library_id: &str) -> Result<Vec<Folder>> {
        let rows: Vec<FolderRow> = sqlx::query_as(
            "SELECT * FROM folders WHERE library_id = ? ORDER BY order_index, normalized_name",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Folder::try_from).collect()
    }

    async fn list_children(
        &self,
        library_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Folder>> {
        let rows: Vec<FolderRow> = match parent_id {
            Some(parent) => {
                sqlx::query_as(
                    "SELECT * FROM folders WHERE library_id = ? AND parent_id = ?
                     ORDER BY order_index, normalized_name",
                )
                .bind(library_id)
                .bind(parent)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM folders WHERE library_id = ? AND parent_id IS NULL
                     ORDER BY order_index, normalized_name",
                )
                .bind(library_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(Folder::try_from).collect()
    }

    async fn set_sort_preference(
        &self,
        library_id: &str,
        folder_id: &str,
        sort_type: SortType,
        ascending: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE folders SET sort_type = ?, sort_ascending = ?, sort_modified = 1
             WHERE library_id = ? AND folder_id = ?",
        )
        .bind(sort_type.as_str())
        .bind(ascending)
        .bind(library_id)
        .bind(folder_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::FolderNotFound(folder_id.to_string()));
        }
        debug!(library_id, folder_id, sort_type = sort_type.as_str(), "sort preference overridden");
        Ok(())
    }

    async fn find_cover_item(&self, library_id: &str, folder_id: &str) -> Result<Option<String>> {
        let folder = self
            .find_by_id(library_id, folder_id)
            .await?
            .ok_or_else(|| LibraryError::FolderNotFound(folder_id.to_string()))?;

        if let Some(cover_id) = folder.cover_id {
            let exists: Option<(String,)> = sqlx::query_as(
                "SELECT item_id FROM folder_items
                 WHERE library_id = ? AND folder_id = ? AND item_id = ?",
            )
            .bind(library_id)
            .bind(folder_id)
            .bind(&cover_id)
            .fetch_optional(&self.pool)
            .await?;
            if exists.is_some() {
                return Ok(Some(cover_id));
            }
        }

        let first: Option<(String,)> = sqlx::query_as(
            "SELECT item_id FROM folder_items WHERE library_id = ? AND folder_id = ?
             ORDER BY order_value, item_id LIMIT 1",
        )
        .bind(library_id)
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(first.map(|(id,)| id))
    }
}
