//! The metadata importer.
//!
//! An import runs FolderSync, then ItemSync, then a deletion sweep, each
//! diffing a source manifest against the stored cursors so unchanged data
//! is never re-fetched. Writes are transactional at pass/batch granularity
//! with the cursor committed alongside, so a crash leaves the store
//! consistent as of the last committed batch and the next sync resumes
//! exactly where it left off.

use crate::error::{Result, SyncError};
use crate::manifest::{FolderManifest, FolderNode, ItemMetadata, ItemTimeManifest};
use core_library::{normalize_name, store, Folder, FolderItem, Item, Library, SyncOutcome};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_source::{resolve_path, SourceEntity, SourceError};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Timestamp assigned to discovered items unknown to both the manifest and
/// the database. Forces inclusion in the current pass; never persisted as a
/// cursor.
pub const SENTINEL_TIMESTAMP: i64 = i64::MAX;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Items per batch in ItemSync
    pub batch_size: usize,
    /// Share of overall progress attributed to FolderSync
    pub folder_weight: f64,
    /// Share of item progress held back for the deletion sweep
    pub sweep_headroom: f64,
    /// Root directory for locally cached assets; None disables asset copies
    pub asset_root: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            folder_weight: 0.10,
            sweep_headroom: 0.10,
            asset_root: None,
        }
    }
}

/// Counts reported by a completed import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub folders_written: u64,
    pub items_written: u64,
    pub items_deleted: u64,
}

/// Drives imports for one store. Cheap to share; sessions are managed by
/// [`crate::service::SyncService`].
pub struct Importer {
    pool: SqlitePool,
    events: EventBus,
    config: ImportConfig,
}

struct ItemPhase {
    items_written: u64,
    items_deleted: u64,
    /// Lowest watermark among items whose metadata fetch failed; caps every
    /// cursor advance so those items re-enter the candidate set next sync
    lowest_failed: Option<i64>,
}

impl Importer {
    pub fn new(pool: SqlitePool, events: EventBus, config: ImportConfig) -> Self {
        Self {
            pool,
            events,
            config,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Root of the local asset cache, when configured.
    pub fn asset_root(&self) -> Option<&std::path::Path> {
        self.config.asset_root.as_deref()
    }

    /// Run a full import session for a library.
    ///
    /// The outcome (success, failed, cancelled) is always persisted on the
    /// library row and mirrored on the event bus.
    #[instrument(skip(self, library, source, cancel), fields(library_id = %library.id))]
    pub async fn import_all(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        cancel: &CancellationToken,
        full_reimport: bool,
    ) -> Result<ImportOutcome> {
        info!(full_reimport, "import session started");
        self.emit(SyncEvent::Started {
            library_id: library.id.clone(),
            full_reimport,
        });

        let result = self.run_phases(library, source, cancel, full_reimport).await;

        let status = match &result {
            Ok(_) => SyncOutcome::Success,
            Err(SyncError::Cancelled) => SyncOutcome::Cancelled,
            Err(_) => SyncOutcome::Failed,
        };
        let mut conn = self.pool.acquire().await.map_err(core_library::LibraryError::from)?;
        store::set_last_sync(&mut conn, &library.id, status).await?;

        match &result {
            Ok(outcome) => {
                info!(
                    folders = outcome.folders_written,
                    items = outcome.items_written,
                    deleted = outcome.items_deleted,
                    "import completed"
                );
                self.emit(SyncEvent::Completed {
                    library_id: library.id.clone(),
                    folders_written: outcome.folders_written,
                    items_written: outcome.items_written,
                    items_deleted: outcome.items_deleted,
                });
            }
            Err(SyncError::Cancelled) => {
                info!("import cancelled");
                self.emit(SyncEvent::Cancelled {
                    library_id: library.id.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "import failed");
                self.emit(SyncEvent::Failed {
                    library_id: library.id.clone(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_phases(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        cancel: &CancellationToken,
        full_reimport: bool,
    ) -> Result<ImportOutcome> {
        let (mut folder_cursor, mut item_cursor) = (library.folder_cursor, library.item_cursor);
        if full_reimport {
            let mut conn = self.pool.acquire().await.map_err(core_library::LibraryError::from)?;
            store::reset_cursors(&mut conn, &library.id).await?;
            folder_cursor = 0;
            item_cursor = 0;
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let folders_written = self.folder_sync(library, source, &mut folder_cursor).await?;
        self.emit_progress(library, self.config.folder_weight);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let item_phase = self
            .item_sync(library, source, cancel, &mut item_cursor)
            .await?;
        self.emit_progress(library, 1.0);

        Ok(ImportOutcome {
            folders_written,
            items_written: item_phase.items_written,
            items_deleted: item_phase.items_deleted,
        })
    }

    /// Reconcile the folder tree against the folder manifest.
    ///
    /// One transaction covers the whole pass: upserts, the sweep of folders
    /// missing from the manifest, and the cursor advance.
    #[instrument(skip_all, fields(library_id = %library.id))]
    async fn folder_sync(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        folder_cursor: &mut i64,
    ) -> Result<u64> {
        let bytes = source.child("metadata.json").await?.read().await?;
        let manifest = FolderManifest::parse(&bytes)?;

        if manifest.modification_time <= *folder_cursor {
            debug!(
                manifest_time = manifest.modification_time,
                cursor = *folder_cursor,
                "folder manifest unchanged; skipping"
            );
            return Ok(0);
        }

        let mut rows = Vec::new();
        let mut order = 0i64;
        flatten_tree(&manifest.children, None, library, &mut order, &mut rows);

        let mut tx = self.pool.begin().await.map_err(core_library::LibraryError::from)?;
        let keep: HashSet<String> = rows.iter().map(|f| f.folder_id.clone()).collect();
        for folder in &rows {
            store::upsert_folder(&mut tx, folder).await?;
        }
        let removed = store::delete_folders_not_in(&mut tx, &library.id, &keep).await?;
        store::set_folder_cursor(&mut tx, &library.id, manifest.modification_time).await?;
        tx.commit().await.map_err(core_library::LibraryError::from)?;

        *folder_cursor = manifest.modification_time;
        info!(
            folders = rows.len(),
            removed, "folder pass committed"
        );
        Ok(rows.len() as u64)
    }

    /// Reconcile items against the item-time manifest, then sweep deletions.
    #[instrument(skip_all, fields(library_id = %library.id))]
    async fn item_sync(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        cancel: &CancellationToken,
        item_cursor: &mut i64,
    ) -> Result<ItemPhase> {
        let bytes = source.child("mtime.json").await?.read().await?;
        let manifest = ItemTimeManifest::parse(&bytes)?;

        let (known, known_folders) = {
            let mut conn = self.pool.acquire().await.map_err(core_library::LibraryError::from)?;
            (
                store::item_watermarks(&mut conn, &library.id).await?,
                store::folder_ids(&mut conn, &library.id).await?,
            )
        };
        let persisted_count = known.len() as i64;

        let mut resolved = manifest.times.clone();
        if manifest.is_incomplete() {
            warn!(
                declared = manifest.declared_count,
                listed = manifest.times.len(),
                "item manifest count mismatch; discovering from backend directory"
            );
            self.discover_items(source, &known, &mut resolved).await?;
        }

        let mut candidates: Vec<(&String, i64)> = resolved
            .iter()
            .filter(|(_, ts)| **ts > *item_cursor)
            .map(|(id, ts)| (id, *ts))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let total = candidates.len();
        let item_weight = (1.0 - self.config.folder_weight) * (1.0 - self.config.sweep_headroom);
        let mut phase = ItemPhase {
            items_written: 0,
            items_deleted: 0,
            lowest_failed: None,
        };
        let mut processed = 0usize;

        for batch in candidates.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.import_batch(library, source, batch, &known_folders, item_cursor, &mut phase)
                .await?;
            processed += batch.len();
            let fraction =
                self.config.folder_weight + item_weight * processed as f64 / total as f64;
            self.emit_progress(library, fraction);
        }

        let resolved_count = resolved.len() as i64;
        if phase.items_written > 0 || persisted_count != resolved_count {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.deletion_sweep(library, &resolved, item_cursor, &mut phase)
                .await?;
        }

        Ok(phase)
    }

    /// Enumerate `images/` for items the manifest failed to list. Known
    /// items resolve to 0 (no re-import); unknown ones get the sentinel.
    async fn discover_items(
        &self,
        source: &dyn SourceEntity,
        known: &HashMap<String, i64>,
        resolved: &mut HashMap<String, i64>,
    ) -> Result<()> {
        let dir = match source.child("images").await {
            Ok(dir) => dir,
            Err(SourceError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in dir.list().await? {
            if !entry.is_dir {
                continue;
            }
            let Some(item_id) = entry.name.strip_suffix(".info") else {
                continue;
            };
            if resolved.contains_key(item_id) {
                continue;
            }
            let timestamp = if known.contains_key(item_id) {
                0
            } else {
                debug!(item_id, "discovered item unknown to manifest and store");
                SENTINEL_TIMESTAMP
            };
            resolved.insert(item_id.to_string(), timestamp);
        }
        Ok(())
    }

    /// Fetch one batch concurrently, then write it in a single transaction.
    ///
    /// A failed fetch is isolated to its item: the rest of the batch is
    /// written, and the cursor advance is capped strictly below the lowest
    /// failed watermark.
    async fn import_batch(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        batch: &[(&String, i64)],
        known_folders: &HashSet<String>,
        item_cursor: &mut i64,
        phase: &mut ItemPhase,
    ) -> Result<()> {
        let fetches = batch
            .iter()
            .map(|(id, _)| self.fetch_item(library, source, id));
        let results = futures::future::join_all(fetches).await;

        let mut rows: Vec<(Item, Vec<FolderItem>, i64)> = Vec::new();
        for ((id, timestamp), result) in batch.iter().zip(results) {
            match result {
                Ok((item, links)) => rows.push((item, links, *timestamp)),
                Err(e) => {
                    warn!(item_id = %id, error = %e, "item fetch failed; isolating");
                    phase.lowest_failed = Some(match phase.lowest_failed {
                        Some(current) => current.min(*timestamp),
                        None => *timestamp,
                    });
                }
            }
        }

        let mut tx = self.pool.begin().await.map_err(core_library::LibraryError::from)?;
        for (item, links, _) in &rows {
            store::upsert_item(&mut tx, item).await?;
            let links: Vec<FolderItem> = links
                .iter()
                .filter(|link| known_folders.contains(&link.folder_id))
                .cloned()
                .collect();
            store::replace_folder_items(&mut tx, &library.id, &item.item_id, &links).await?;
        }

        let batch_max = rows
            .iter()
            .map(|(_, _, ts)| *ts)
            .filter(|ts| *ts != SENTINEL_TIMESTAMP)
            .max();
        let mut new_cursor = batch_max.unwrap_or(*item_cursor);
        if let Some(failed) = phase.lowest_failed {
            new_cursor = new_cursor.min(failed.saturating_sub(1));
        }
        new_cursor = new_cursor.max(*item_cursor);
        if new_cursor != *item_cursor {
            store::set_item_cursor(&mut tx, &library.id, new_cursor).await?;
        }
        tx.commit().await.map_err(core_library::LibraryError::from)?;

        *item_cursor = new_cursor;
        phase.items_written += rows.len() as u64;
        Ok(())
    }

    /// Remove items absent from the resolved id set and settle the cursor
    /// on the true maximum resolved watermark.
    async fn deletion_sweep(
        &self,
        library: &Library,
        resolved: &HashMap<String, i64>,
        item_cursor: &mut i64,
        phase: &mut ItemPhase,
    ) -> Result<()> {
        let keep: HashSet<String> = resolved.keys().cloned().collect();
        let true_max = resolved
            .values()
            .copied()
            .filter(|ts| *ts != SENTINEL_TIMESTAMP)
            .max();

        let mut new_cursor = true_max.unwrap_or(*item_cursor);
        if let Some(failed) = phase.lowest_failed {
            new_cursor = new_cursor.min(failed.saturating_sub(1));
        }
        new_cursor = new_cursor.max(*item_cursor);

        let mut tx = self.pool.begin().await.map_err(core_library::LibraryError::from)?;
        let deleted = store::delete_items_not_in(&mut tx, &library.id, &keep).await?;
        if new_cursor != *item_cursor {
            store::set_item_cursor(&mut tx, &library.id, new_cursor).await?;
        }
        tx.commit().await.map_err(core_library::LibraryError::from)?;

        *item_cursor = new_cursor;
        phase.items_deleted = deleted;
        info!(deleted, cursor = new_cursor, "deletion sweep committed");
        Ok(())
    }

    /// Fetch one item's metadata (and optionally its assets) and build its
    /// row plus folder links.
    async fn fetch_item(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        item_id: &str,
    ) -> Result<(Item, Vec<FolderItem>)> {
        let info_dir = format!("{item_id}.info");
        let entity = resolve_path(source, &["images", &info_dir, "metadata.json"]).await?;
        let metadata = ItemMetadata::parse(item_id, &entity.read().await?)?;

        if library.use_local_cache {
            if let Some(asset_root) = &self.config.asset_root {
                self.copy_assets(library, source, item_id, &metadata, asset_root)
                    .await?;
            }
        }

        let watermark = metadata.watermark();
        let links: Vec<FolderItem> = metadata
            .folders
            .iter()
            .map(|folder_id| FolderItem {
                library_id: library.id.clone(),
                folder_id: folder_id.clone(),
                item_id: item_id.to_string(),
                order_value: metadata
                    .order
                    .get(folder_id)
                    .cloned()
                    .unwrap_or_else(|| watermark.to_string()),
            })
            .collect();

        Ok((metadata.into_item(&library.id, item_id), links))
    }

    /// Copy the item's image and thumbnail into the local asset cache. A
    /// missing remote thumbnail is skipped, not an error.
    async fn copy_assets(
        &self,
        library: &Library,
        source: &dyn SourceEntity,
        item_id: &str,
        metadata: &ItemMetadata,
        asset_root: &std::path::Path,
    ) -> Result<()> {
        let dest_dir = asset_root
            .join(&library.id)
            .join("images")
            .join(format!("{item_id}.info"));

        let image_rel = metadata.image_path(item_id);
        let image = async {
            let segments: Vec<&str> = image_rel.split('/').collect();
            let entity = resolve_path(source, &segments).await?;
            let file_name = segments.last().copied().unwrap_or_default();
            entity.copy_to(&dest_dir.join(file_name)).await
        };

        let thumbnail_rel = metadata.thumbnail_path(item_id);
        let thumbnail = async {
            let Some(rel) = &thumbnail_rel else {
                return Ok(());
            };
            let segments: Vec<&str> = rel.split('/').collect();
            match resolve_path(source, &segments).await {
                Ok(entity) => {
                    let file_name = segments.last().copied().unwrap_or_default();
                    entity.copy_to(&dest_dir.join(file_name)).await
                }
                Err(SourceError::NotFound(_)) => {
                    debug!(item_id, "remote thumbnail absent; skipping");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        let (image_result, thumbnail_result) = tokio::join!(image, thumbnail);
        image_result?;
        thumbnail_result?;
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        self.events.emit(CoreEvent::Sync(event)).ok();
    }

    fn emit_progress(&self, library: &Library, fraction: f64) {
        self.emit(SyncEvent::Progress {
            library_id: library.id.clone(),
            fraction: fraction.clamp(0.0, 1.0),
        });
    }
}

/// Depth-first flattening of the manifest tree. Nodes without an id are
/// skipped with their subtree; order indexes are dense in traversal order.
fn flatten_tree(
    nodes: &[FolderNode],
    parent_id: Option<&str>,
    library: &Library,
    order: &mut i64,
    out: &mut Vec<Folder>,
) {
    for node in nodes {
        if node.id.is_empty() {
            warn!(name = %node.name, "folder node missing id; skipping subtree");
            continue;
        }
        let (sort_type, sort_ascending) = node.sort_preference();
        out.push(Folder {
            library_id: library.id.clone(),
            folder_id: node.id.clone(),
            parent_id: parent_id.map(str::to_string),
            name: node.name.clone(),
            normalized_name: normalize_name(&node.name),
            modified_at: node.modification_time,
            order_index: *order,
            cover_id: node.cover_id.clone(),
            sort_type,
            sort_ascending,
            sort_modified: false,
        });
        *order += 1;
        flatten_tree(&node.children, Some(&node.id), library, order, out);
    }
}
