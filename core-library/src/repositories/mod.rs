//! Repository traits and their SQLite implementations.
//!
//! Repositories serve interactive reads and the few interactive writes
//! (library CRUD, sort preferences) off the shared pool. Importer writes go
//! through [`crate::store`] inside explicit transactions instead.

pub mod folder;
pub mod item;
pub mod library;

pub use folder::{FolderRepository, SqliteFolderRepository};
pub use item::{ItemQuery, ItemRepository, SqliteItemRepository};
pub use library::{LibraryRepository, SqliteLibraryRepository};
