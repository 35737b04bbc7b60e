//! Source construction from stored descriptors.

use core_source::{
    AlwaysMaterialized, BackendKind, LocalEntity, Materializer, SourceDescriptor, SourceEntity,
};
use provider_google_drive::GoogleDriveSource;
use provider_onedrive::OneDriveSource;
use std::sync::Arc;

/// Opens the backing [`SourceEntity`] for any stored descriptor.
///
/// One factory is shared across sync sessions so provider-level state, in
/// particular the Drive path cache and request gate, survives between runs.
pub struct SourceFactory {
    google_drive: GoogleDriveSource,
    onedrive: OneDriveSource,
    materializer: Arc<dyn Materializer>,
}

impl SourceFactory {
    pub fn new(google_drive: GoogleDriveSource, onedrive: OneDriveSource) -> Self {
        Self {
            google_drive,
            onedrive,
            materializer: Arc::new(AlwaysMaterialized),
        }
    }

    /// Use a placeholder-aware materializer for local roots.
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    /// Root entity for the described backend. The locator is a directory
    /// path for local roots and a backend folder id for cloud roots.
    pub fn open(&self, descriptor: &SourceDescriptor) -> Box<dyn SourceEntity> {
        match descriptor.backend {
            BackendKind::Local => Box::new(LocalEntity::root(
                descriptor.locator.clone(),
                Arc::clone(&self.materializer),
            )),
            BackendKind::GoogleDrive => self.google_drive.root_entity(&descriptor.locator),
            BackendKind::OneDrive => self.onedrive.root_entity(&descriptor.locator),
        }
    }
}
