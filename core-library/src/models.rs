//! Data model for the mirrored library.
//!
//! All rows are scoped by `library_id`; `Folder` and `Item` rows are
//! created and mutated exclusively by the importer. The only interactive
//! writes are a folder's sort-preference fields and the library's own
//! selection metadata.

use core_source::SourceDescriptor;
use serde::{Deserialize, Serialize};

/// Outcome of the most recent sync session, persisted on the library row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Never synced
    None,
    Success,
    Failed,
    Cancelled,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::None => "none",
            SyncOutcome::Success => "success",
            SyncOutcome::Failed => "failed",
            SyncOutcome::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SyncOutcome::None),
            "success" => Some(SyncOutcome::Success),
            "failed" => Some(SyncOutcome::Failed),
            "cancelled" => Some(SyncOutcome::Cancelled),
            _ => None,
        }
    }
}

/// Per-folder sort vocabulary.
///
/// External manifest directives map onto this set case-insensitively;
/// anything unrecognized falls back to [`SortType::Import`], the
/// application default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Manual,
    Import,
    Name,
    Ext,
    Mtime,
    Btime,
    FileSize,
    Resolution,
    Rating,
    Duration,
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Manual => "manual",
            SortType::Import => "import",
            SortType::Name => "name",
            SortType::Ext => "ext",
            SortType::Mtime => "mtime",
            SortType::Btime => "btime",
            SortType::FileSize => "filesize",
            SortType::Resolution => "resolution",
            SortType::Rating => "rating",
            SortType::Duration => "duration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(SortType::Manual),
            "import" => Some(SortType::Import),
            "name" => Some(SortType::Name),
            "ext" => Some(SortType::Ext),
            "mtime" => Some(SortType::Mtime),
            "btime" => Some(SortType::Btime),
            "filesize" => Some(SortType::FileSize),
            "resolution" => Some(SortType::Resolution),
            "rating" => Some(SortType::Rating),
            "duration" => Some(SortType::Duration),
            _ => None,
        }
    }

    /// Map an external manifest directive, falling back to the default for
    /// unrecognized values.
    pub fn from_directive(directive: &str) -> Self {
        Self::parse(&directive.to_lowercase()).unwrap_or(SortType::Import)
    }
}

impl Default for SortType {
    fn default() -> Self {
        SortType::Import
    }
}

/// A mirrored media library and its sync state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Stable identifier (uuid string)
    pub id: String,
    /// Display name
    pub name: String,
    /// Backend + locator this library mirrors
    pub source: SourceDescriptor,
    /// Whether image/thumbnail assets are copied into the local cache
    pub use_local_cache: bool,
    /// Folder modification watermark already imported
    pub folder_cursor: i64,
    /// Item modification watermark already imported
    pub item_cursor: i64,
    /// Outcome of the most recent sync session
    pub last_sync: SyncOutcome,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Library {
    /// Create a library for the given source with zeroed cursors.
    pub fn new(name: impl Into<String>, source: SourceDescriptor, use_local_cache: bool) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source,
            use_local_cache,
            folder_cursor: 0,
            item_cursor: 0,
            last_sync: SyncOutcome::None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("library id must not be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("library name must not be empty".to_string());
        }
        Ok(())
    }
}

/// A folder in the mirrored tree. Composite key (library_id, folder_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub library_id: String,
    pub folder_id: String,
    /// Parent folder id within the same library, None for roots
    pub parent_id: Option<String>,
    pub name: String,
    /// Lowercased name used for locale-stable ordering
    pub normalized_name: String,
    pub modified_at: i64,
    /// Dense manual-order index assigned in manifest traversal order
    pub order_index: i64,
    /// Item chosen as the folder cover, if any
    pub cover_id: Option<String>,
    pub sort_type: SortType,
    pub sort_ascending: bool,
    /// True once the user overrode the sort preference; shields the sort
    /// fields from re-import
    pub sort_modified: bool,
}

impl Folder {
    pub fn validate(&self) -> Result<(), String> {
        if self.library_id.is_empty() {
            return Err("folder library_id must not be empty".to_string());
        }
        if self.folder_id.is_empty() {
            return Err("folder id must not be empty".to_string());
        }
        Ok(())
    }
}

/// Normalize a display name for sorting.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A media item. Composite key (library_id, item_id).
///
/// Absent optional fields in the source metadata default to their zero
/// values, so every column is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub library_id: String,
    pub item_id: String,
    pub name: String,
    pub ext: String,
    pub size: i64,
    pub btime: i64,
    pub mtime: i64,
    /// Source-side modification watermark driving the incremental diff
    pub modified_at: i64,
    pub height: i64,
    pub width: i64,
    pub duration: f64,
    pub is_deleted: bool,
    pub star: i64,
    pub no_thumbnail: bool,
    pub tags: Vec<String>,
    pub annotation: String,
}

impl Item {
    /// An item with every field zeroed except the keys.
    pub fn empty(library_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            item_id: item_id.into(),
            name: String::new(),
            ext: String::new(),
            size: 0,
            btime: 0,
            mtime: 0,
            modified_at: 0,
            height: 0,
            width: 0,
            duration: 0.0,
            is_deleted: false,
            star: 0,
            no_thumbnail: false,
            tags: Vec::new(),
            annotation: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.library_id.is_empty() {
            return Err("item library_id must not be empty".to_string());
        }
        if self.item_id.is_empty() {
            return Err("item id must not be empty".to_string());
        }
        Ok(())
    }
}

/// Folder membership of an item, with its manual order value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderItem {
    pub library_id: String,
    pub folder_id: String,
    pub item_id: String,
    /// Opaque ordering string; defaults to the item's modification time
    pub order_value: String,
}
