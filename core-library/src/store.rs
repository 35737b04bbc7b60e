//! Connection-level write helpers used inside importer transactions.
//!
//! The repositories in [`crate::repositories`] serve interactive reads off
//! the pool; the importer instead opens one transaction per pass and drives
//! these helpers against it so a pass commits or rolls back as a unit.

use crate::error::Result;
use crate::models::{Folder, FolderItem, Item, SyncOutcome};
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};

/// Insert or update a folder row.
///
/// The sort fields are only written when the stored row has not been
/// overridden by the user (`sort_modified = 0`), so re-import never clobbers
/// an interactive sort preference.
pub async fn upsert_folder(conn: &mut SqliteConnection, folder: &Folder) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO folders (
            library_id, folder_id, parent_id, name, normalized_name,
            modified_at, order_index, cover_id, sort_type, sort_ascending, sort_modified
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT (library_id, folder_id) DO UPDATE SET
            parent_id = excluded.parent_id,
            name = excluded.name,
            normalized_name = excluded.normalized_name,
            modified_at = excluded.modified_at,
            order_index = excluded.order_index,
            cover_id = excluded.cover_id,
            sort_type = CASE WHEN folders.sort_modified = 0
                THEN excluded.sort_type ELSE folders.sort_type END,
            sort_ascending = CASE WHEN folders.sort_modified = 0
                THEN excluded.sort_ascending ELSE folders.sort_ascending END
        "#,
    )
    .bind(&folder.library_id)
    .bind(&folder.folder_id)
    .bind(&folder.parent_id)
    .bind(&folder.name)
    .bind(&folder.normalized_name)
    .bind(folder.modified_at)
    .bind(folder.order_index)
    .bind(&folder.cover_id)
    .bind(folder.sort_type.as_str())
    .bind(folder.sort_ascending)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete folders absent from the current manifest. Returns the number of
/// rows removed; membership rows follow via cascade.
pub async fn delete_folders_not_in(
    conn: &mut SqliteConnection,
    library_id: &str,
    keep: &HashSet<String>,
) -> Result<u64> {
    let existing = folder_ids(&mut *conn, library_id).await?;
    let mut deleted = 0u64;
    for folder_id in existing.difference(keep) {
        let result = sqlx::query("DELETE FROM folders WHERE library_id = ? AND folder_id = ?")
            .bind(library_id)
            .bind(folder_id)
            .execute(&mut *conn)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

/// Insert or fully replace an item row.
pub async fn upsert_item(conn: &mut SqliteConnection, item: &Item) -> Result<()> {
    let tags = serde_json::to_string(&item.tags)?;
    sqlx::query(
        r#"
        INSERT INTO items (
            library_id, item_id, name, ext, size, btime, mtime, modified_at,
            height, width, duration, is_deleted, star, no_thumbnail, tags, annotation
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (library_id, item_id) DO UPDATE SET
            name = excluded.name,
            ext = excluded.ext,
            size = excluded.size,
            btime = excluded.btime,
            mtime = excluded.mtime,
            modified_at = excluded.modified_at,
            height = excluded.height,
            width = excluded.width,
            duration = excluded.duration,
            is_deleted = excluded.is_deleted,
            star = excluded.star,
            no_thumbnail = excluded.no_thumbnail,
            tags = excluded.tags,
            annotation = excluded.annotation
        "#,
    )
    .bind(&item.library_id)
    .bind(&item.item_id)
    .bind(&item.name)
    .bind(&item.ext)
    .bind(item.size)
    .bind(item.btime)
    .bind(item.mtime)
    .bind(item.modified_at)
    .bind(item.height)
    .bind(item.width)
    .bind(item.duration)
    .bind(item.is_deleted)
    .bind(item.star)
    .bind(item.no_thumbnail)
    .bind(tags)
    .bind(&item.annotation)
    .execute(conn)
    .await?;
    Ok(())
}

/// Replace the folder memberships of a single item.
pub async fn replace_folder_items(
    conn: &mut SqliteConnection,
    library_id: &str,
    item_id: &str,
    links: &[FolderItem],
) -> Result<()> {
    sqlx::query("DELETE FROM folder_items WHERE library_id = ? AND item_id = ?")
        .bind(library_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

    for link in links {
        sqlx::query(
            r#"
            INSERT INTO folder_items (library_id, folder_id, item_id, order_value)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&link.library_id)
        .bind(&link.folder_id)
        .bind(&link.item_id)
        .bind(&link.order_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Delete items absent from the source's item-time manifest. Returns the
/// number of rows removed.
pub async fn delete_items_not_in(
    conn: &mut SqliteConnection,
    library_id: &str,
    keep: &HashSet<String>,
) -> Result<u64> {
    let existing: Vec<(String,)> = sqlx::query_as("SELECT item_id FROM items WHERE library_id = ?")
        .bind(library_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut deleted = 0u64;
    for (item_id,) in existing {
        if keep.contains(&item_id) {
            continue;
        }
        let result = sqlx::query("DELETE FROM items WHERE library_id = ? AND item_id = ?")
            .bind(library_id)
            .bind(&item_id)
            .execute(&mut *conn)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

/// All folder ids known for a library.
pub async fn folder_ids(
    conn: &mut SqliteConnection,
    library_id: &str,
) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT folder_id FROM folders WHERE library_id = ?")
        .bind(library_id)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Map of item id to stored modification watermark for a library.
pub async fn item_watermarks(
    conn: &mut SqliteConnection,
    library_id: &str,
) -> Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT item_id, modified_at FROM items WHERE library_id = ?")
            .bind(library_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Advance the folder cursor, committed with the folder pass.
pub async fn set_folder_cursor(
    conn: &mut SqliteConnection,
    library_id: &str,
    cursor: i64,
) -> Result<()> {
    sqlx::query("UPDATE libraries SET folder_cursor = ?, updated_at = ? WHERE id = ?")
        .bind(cursor)
        .bind(chrono::Utc::now().timestamp())
        .bind(library_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Advance the item cursor, committed with each item batch.
pub async fn set_item_cursor(
    conn: &mut SqliteConnection,
    library_id: &str,
    cursor: i64,
) -> Result<()> {
    sqlx::query("UPDATE libraries SET item_cursor = ?, updated_at = ? WHERE id = ?")
        .bind(cursor)
        .bind(chrono::Utc::now().timestamp())
        .bind(library_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Reset both cursors to zero so the next sync re-imports everything.
pub async fn reset_cursors(conn: &mut SqliteConnection, library_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE libraries SET folder_cursor = 0, item_cursor = 0, updated_at = ? WHERE id = ?",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(library_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Record the outcome of the most recent sync session.
pub async fn set_last_sync(
    conn: &mut SqliteConnection,
    library_id: &str,
    outcome: SyncOutcome,
) -> Result<()> {
    sqlx::query("UPDATE libraries SET last_sync = ?, updated_at = ? WHERE id = ?")
        .bind(outcome.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(library_id)
        .execute(conn)
        .await?;
    Ok(())
}
