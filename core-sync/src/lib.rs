//! Incremental metadata synchronization.
//!
//! A sync session walks a [`core_source::SourceEntity`] root, diffs its
//! manifests against per-library cursors, and writes folders, items, and
//! folder membership into the library store in transactional batches.
//! Sessions are owned by [`SyncService`]; progress and outcomes are
//! published on the [`core_runtime::events::EventBus`].

pub mod error;
pub mod importer;
pub mod manifest;
pub mod service;
pub mod sources;

pub use error::{Result, SyncError};
pub use importer::{ImportConfig, ImportOutcome, Importer, SENTINEL_TIMESTAMP};
pub use manifest::{FolderManifest, FolderNode, ItemMetadata, ItemTimeManifest, COUNT_KEY};
pub use service::SyncService;
pub use sources::SourceFactory;
