//! # Library Store
//!
//! SQLite persistence for mirrored libraries: the library rows themselves,
//! the folder tree, items, and folder membership, plus the sync cursors the
//! importer advances.
//!
//! Two access paths share the schema:
//!
//! - [`repositories`] serve interactive reads and the small set of
//!   interactive writes (library CRUD, per-folder sort overrides)
//! - [`store`] exposes connection-level helpers the importer drives inside
//!   its own transactions, one per folder pass or item batch

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{normalize_name, Folder, FolderItem, Item, Library, SortType, SyncOutcome};
pub use repositories::{
    FolderRepository, ItemQuery, ItemRepository, LibraryRepository, SqliteFolderRepository,
    SqliteItemRepository, SqliteLibraryRepository,
};
