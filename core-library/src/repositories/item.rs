//! Item repository: reads over the mirrored items, with folder listings
//! ordered by the folder's effective sort preference.

use crate::error::{LibraryError, Result};
use crate::models::{Item, SortType};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Ordering applied to a folder listing.
#[derive(Debug, Clone, Copy)]
pub struct ItemQuery {
    pub sort: SortType,
    pub ascending: bool,
}

impl ItemQuery {
    pub fn new(sort: SortType, ascending: bool) -> Self {
        Self { sort, ascending }
    }

    fn order_clause(&self) -> String {
        let expr = match self.sort {
            SortType::Manual => "fi.order_value",
            SortType::Import => "i.modified_at",
            SortType::Name => "i.name COLLATE NOCASE",
            SortType::Ext => "i.ext COLLATE NOCASE",
            SortType::Mtime => "i.mtime",
            SortType::Btime => "i.btime",
            SortType::FileSize => "i.size",
            SortType::Resolution => "i.height * i.width",
            SortType::Rating => "i.star",
            SortType::Duration => "i.duration",
        };
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!("{expr} {direction}, i.item_id ASC")
    }
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self::new(SortType::Import, true)
    }
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_by_id(&self, library_id: &str, item_id: &str) -> Result<Option<Item>>;

    /// Members of a folder ordered per the query. Soft-deleted items are
    /// excluded.
    async fn list_by_folder(
        &self,
        library_id: &str,
        folder_id: &str,
        query: ItemQuery,
    ) -> Result<Vec<Item>>;

    /// Live (not soft-deleted) item count for a library.
    async fn count(&self, library_id: &str) -> Result<i64>;
}

#[derive(Debug, FromRow)]
struct ItemRow {
    library_id: String,
    item_id: String,
    name: String,
    ext: String,
    size: i64,
    btime: i64,
    mtime: i64,
    modified_at: i64,
    height: i64,
    width: i64,
    duration: f64,
    is_deleted: bool,
    star: i64,
    no_thumbnail: bool,
    tags: String,
    annotation: String,
}

impl TryFrom<ItemRow> for Item {
    type Error = LibraryError;

    fn try_from(row: ItemRow) -> Result<Item> {
        let tags: Vec<String> = serde_json::from_str(&row.tags)?;
        Ok(Item {
            library_id: row.library_id,
            item_id: row.item_id,
            name: row.name,
            ext: row.ext,
            size: row.size,
            btime: row.btime,
            mtime: row.mtime,
            modified_at: row.modified_at,
            height: row.height,
            width: row.width,
            duration: row.duration,
            is_deleted: row.is_deleted,
            star: row.star,
            no_thumbnail: row.no_thumbnail,
            tags,
            annotation: row.annotation,
        })
    }
}

/// SQLite-backed [`ItemRepository`].
pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn find_by_id(&self, library_id: &str, item_id: &str) -> Result<Option<Item>> {
        let row: Option<ItemRow> =
            sqlx::query_as("SELECT * FROM items WHERE library_id = ? AND item_id = ?")
                .bind(library_id)
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Item::try_from).transpose()
    }

    async fn list_by_folder(
        &self,
        library_id: &str,
        folder_id: &str,
        query: ItemQuery,
    ) -> Result<Vec<Item>> {
        // The order clause is built from a fixed vocabulary, never user input.
        let sql = format!(
            "SELECT i.* FROM items i
             JOIN folder_items fi
               ON fi.library_id = i.library_id AND fi.item_id = i.item_id
             WHERE i.library_id = ? AND fi.folder_id = ? AND i.is_deleted = 0
             ORDER BY {}",
            query.order_clause()
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(library_id)
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Item::try_from).collect()
    }

    async fn count(&self, library_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM items WHERE library_id = ? AND is_deleted = 0")
                .bind(library_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
