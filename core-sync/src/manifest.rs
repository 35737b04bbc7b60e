//! Manifest documents read from the source root.
//!
//! Three JSON documents drive the import:
//! - `metadata.json`: the folder tree, with a top-level modification
//!   watermark that short-circuits unchanged folder passes
//! - `mtime.json`: flat item-id to modification-time map, with the reserved
//!   key `"all"` declaring the total item count
//! - `images/{itemId}.info/metadata.json`: one item's metadata; every field
//!   is optional and defaults to its zero value

use crate::error::{Result, SyncError};
use core_library::{Item, SortType};
use serde::Deserialize;
use std::collections::HashMap;

/// Reserved key in the item-time manifest carrying the total count.
pub const COUNT_KEY: &str = "all";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderManifest {
    pub modification_time: i64,
    #[serde(default)]
    pub children: Vec<FolderNode>,
}

impl FolderManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::corrupt_manifest("metadata.json", e))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modification_time: i64,
    #[serde(default)]
    pub children: Vec<FolderNode>,
    /// External sort directive, mapped onto [`SortType`]
    pub order_by: Option<String>,
    pub sort_increase: Option<bool>,
    pub cover_id: Option<String>,
}

impl FolderNode {
    /// Sort preference declared by the manifest, with the fallback applied.
    pub fn sort_preference(&self) -> (SortType, bool) {
        let sort_type = self
            .order_by
            .as_deref()
            .map(SortType::from_directive)
            .unwrap_or_default();
        (sort_type, self.sort_increase.unwrap_or(true))
    }
}

/// Parsed item-time manifest.
#[derive(Debug, Clone)]
pub struct ItemTimeManifest {
    /// Item id to modification time
    pub times: HashMap<String, i64>,
    /// Declared total item count
    pub declared_count: i64,
}

impl ItemTimeManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut times: HashMap<String, i64> = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::corrupt_manifest("mtime.json", e))?;
        let declared_count = times.remove(COUNT_KEY).unwrap_or(times.len() as i64);
        Ok(Self {
            times,
            declared_count,
        })
    }

    /// Whether the declared count disagrees with the map itself, meaning
    /// the manifest may be missing items.
    pub fn is_incomplete(&self) -> bool {
        self.declared_count != self.times.len() as i64
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub btime: i64,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub modification_time: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub no_thumbnail: bool,
    #[serde(default)]
    pub star: i64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub folders: Vec<String>,
    /// Per-folder manual order values
    #[serde(default)]
    pub order: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub annotation: String,
}

impl ItemMetadata {
    pub fn parse(item_id: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            SyncError::corrupt_manifest(&format!("images/{item_id}.info/metadata.json"), e)
        })
    }

    /// Modification watermark stored on the item row.
    pub fn watermark(&self) -> i64 {
        if self.modification_time != 0 {
            self.modification_time
        } else {
            self.last_modified
        }
    }

    /// Build the item row, zero-defaulting anything absent.
    pub fn into_item(self, library_id: &str, item_id: &str) -> Item {
        let modified_at = self.watermark();
        Item {
            library_id: library_id.to_string(),
            item_id: item_id.to_string(),
            name: self.name,
            ext: self.ext,
            size: self.size,
            btime: self.btime,
            mtime: self.mtime,
            modified_at,
            height: self.height,
            width: self.width,
            duration: self.duration,
            is_deleted: self.is_deleted,
            star: self.star,
            no_thumbnail: self.no_thumbnail,
            tags: self.tags,
            annotation: self.annotation,
        }
    }

    /// Relative source path of the item's image asset.
    pub fn image_path(&self, item_id: &str) -> String {
        format!("images/{}.info/{}.{}", item_id, self.name, self.ext)
    }

    /// Relative source path of the thumbnail, None when the item declares
    /// it has no separate thumbnail.
    pub fn thumbnail_path(&self, item_id: &str) -> Option<String> {
        if self.no_thumbnail {
            None
        } else {
            Some(format!(
                "images/{}.info/{}_thumbnail.png",
                item_id, self.name
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_manifest_parsing() {
        let body = r#"{
            "modificationTime": 1700000000,
            "children": [
                {
                    "id": "f1",
                    "name": "Trips",
                    "modificationTime": 1699990000,
                    "orderBy": "NAME",
                    "sortIncrease": false,
                    "coverId": "item-1",
                    "children": [{"id": "f2", "name": "Alps", "children": []}]
                }
            ]
        }"#;
        let manifest = FolderManifest::parse(body.as_bytes()).unwrap();
        assert_eq!(manifest.modification_time, 1700000000);
        assert_eq!(manifest.children.len(), 1);
        let node = &manifest.children[0];
        assert_eq!(node.sort_preference(), (SortType::Name, false));
        assert_eq!(node.children[0].name, "Alps");
        // No directive falls back to the default, ascending.
        assert_eq!(node.children[0].sort_preference(), (SortType::Import, true));
    }

    #[test]
    fn test_corrupt_folder_manifest() {
        let result = FolderManifest::parse(b"not json");
        assert!(matches!(result, Err(SyncError::CorruptManifest { .. })));
    }

    #[test]
    fn test_item_time_manifest_extracts_count_key() {
        let body = r#"{"all": 2, "item-a": 100, "item-b": 200}"#;
        let manifest = ItemTimeManifest::parse(body.as_bytes()).unwrap();
        assert_eq!(manifest.declared_count, 2);
        assert_eq!(manifest.times.len(), 2);
        assert_eq!(manifest.times["item-a"], 100);
        assert!(!manifest.is_incomplete());
    }

    #[test]
    fn test_item_time_manifest_count_mismatch() {
        let body = r#"{"all": 3, "item-a": 100}"#;
        let manifest = ItemTimeManifest::parse(body.as_bytes()).unwrap();
        assert!(manifest.is_incomplete());
    }

    #[test]
    fn test_item_metadata_zero_defaults() {
        let metadata = ItemMetadata::parse("x", b"{}").unwrap();
        let item = metadata.into_item("lib", "x");
        assert_eq!(item.name, "");
        assert_eq!(item.size, 0);
        assert_eq!(item.tags, Vec::<String>::new());
        assert!(!item.is_deleted);
    }

    #[test]
    fn test_item_metadata_asset_paths() {
        let body = r#"{"name": "sunset", "ext": "jpg", "noThumbnail": false}"#;
        let metadata = ItemMetadata::parse("i1", body.as_bytes()).unwrap();
        assert_eq!(metadata.image_path("i1"), "images/i1.info/sunset.jpg");
        assert_eq!(
            metadata.thumbnail_path("i1").as_deref(),
            Some("images/i1.info/sunset_thumbnail.png")
        );

        let no_thumb = ItemMetadata::parse("i1", br#"{"noThumbnail": true}"#).unwrap();
        assert_eq!(no_thumb.thumbnail_path("i1"), None);
    }

    #[test]
    fn test_watermark_falls_back_to_last_modified() {
        let metadata = ItemMetadata::parse("x", br#"{"lastModified": 42}"#).unwrap();
        assert_eq!(metadata.watermark(), 42);
        let explicit =
            ItemMetadata::parse("x", br#"{"modificationTime": 7, "lastModified": 42}"#).unwrap();
        assert_eq!(explicit.watermark(), 7);
    }
}
