//! Local filesystem source, with support for cloud placeholder files.
//!
//! Sync clients like the OneDrive desktop client expose placeholder files
//! whose content is not on disk until the platform hydrates them. Before a
//! read, the entity asks the [`Materializer`] to hydrate the path and polls
//! until the content is present or a ceiling elapses.

use crate::entity::{EntryMeta, SourceEntity};
use crate::error::{Result, SourceError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hook for platform placeholder hydration.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Whether the file's content is fully present on disk.
    async fn is_materialized(&self, path: &Path) -> Result<bool>;

    /// Ask the platform to begin hydrating the file.
    async fn request_materialize(&self, path: &Path) -> Result<()>;
}

/// Materializer for plain filesystems without placeholders.
pub struct AlwaysMaterialized;

#[async_trait]
impl Materializer for AlwaysMaterialized {
    async fn is_materialized(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn request_materialize(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    pub poll_interval: Duration,
    /// Ceiling on a single hydration wait
    pub timeout: Duration,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(300),
        }
    }
}

/// A file or directory on the local filesystem.
pub struct LocalEntity {
    path: PathBuf,
    name: String,
    materializer: Arc<dyn Materializer>,
    config: MaterializeConfig,
}

impl LocalEntity {
    /// Entity for a library root directory.
    pub fn root(path: impl Into<PathBuf>, materializer: Arc<dyn Materializer>) -> Self {
        Self::root_with_config(path, materializer, MaterializeConfig::default())
    }

    pub fn root_with_config(
        path: impl Into<PathBuf>,
        materializer: Arc<dyn Materializer>,
        config: MaterializeConfig,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            materializer,
            config,
        }
    }

    async fn ensure_materialized(&self) -> Result<()> {
        if self.materializer.is_materialized(&self.path).await? {
            return Ok(());
        }

        debug!(path = %self.path.display(), "requesting placeholder hydration");
        self.materializer.request_materialize(&self.path).await?;

        let deadline = tokio::time::Instant::now() + self.config.timeout;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if self.materializer.is_materialized(&self.path).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SourceError::MaterializeTimeout {
                    path: self.path.display().to_string(),
                    timeout_secs: self.config.timeout.as_secs(),
                });
            }
        }
    }
}

#[async_trait]
impl SourceEntity for LocalEntity {
    fn name(&self) -> &str {
        &self.name
    }

    async fn child(&self, name: &str) -> Result<Box<dyn SourceEntity>> {
        let path = self.path.join(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        Ok(Box::new(LocalEntity {
            path,
            name: name.to_string(),
            materializer: self.materializer.clone(),
            config: self.config.clone(),
        }))
    }

    async fn read(&self) -> Result<Bytes> {
        self.ensure_materialized().await?;
        let content = tokio::fs::read(&self.path).await?;
        Ok(Bytes::from(content))
    }

    async fn list(&self) -> Result<Vec<EntryMeta>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(EntryMeta {
                id: name.clone(),
                name,
                is_dir,
            });
        }
        Ok(entries)
    }

    async fn copy_to(&self, dest: &Path) -> Result<()> {
        self.ensure_materialized().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::copy(&self.path, dest).await {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("metadata.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("images/a.png"), b"png-bytes").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_child_read_list() {
        let dir = setup();
        let root = LocalEntity::root(dir.path(), Arc::new(AlwaysMaterialized));

        let manifest = root.child("metadata.json").await.unwrap();
        assert_eq!(manifest.read().await.unwrap(), Bytes::from_static(b"{}"));

        let mut names: Vec<_> = root
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("images".to_string(), true),
                ("metadata.json".to_string(), false)
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_child_is_not_found() {
        let dir = setup();
        let root = LocalEntity::root(dir.path(), Arc::new(AlwaysMaterialized));
        let result = root.child("absent.json").await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_to_creates_parents() {
        let dir = setup();
        let dest_dir = tempfile::tempdir().unwrap();
        let root = LocalEntity::root(dir.path(), Arc::new(AlwaysMaterialized));

        let file = crate::entity::resolve_path(&root, &["images", "a.png"])
            .await
            .unwrap();
        let dest = dest_dir.path().join("nested/out.png");
        file.copy_to(&dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"png-bytes");
    }

    struct HydratesAfter {
        polls_needed: usize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl Materializer for HydratesAfter {
        async fn is_materialized(&self, _path: &Path) -> Result<bool> {
            Ok(self.polls.fetch_add(1, Ordering::SeqCst) >= self.polls_needed)
        }

        async fn request_materialize(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waits_for_hydration() {
        let dir = setup();
        let root = LocalEntity::root(
            dir.path(),
            Arc::new(HydratesAfter {
                polls_needed: 3,
                polls: AtomicUsize::new(0),
            }),
        );
        let file = root.child("metadata.json").await.unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(file.read().await.unwrap(), Bytes::from_static(b"{}"));
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    struct NeverMaterialized;

    #[async_trait]
    impl Materializer for NeverMaterialized {
        async fn is_materialized(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }

        async fn request_materialize(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydration_timeout() {
        let dir = setup();
        let root = LocalEntity::root_with_config(
            dir.path(),
            Arc::new(NeverMaterialized),
            MaterializeConfig {
                poll_interval: Duration::from_millis(200),
                timeout: Duration::from_secs(2),
            },
        );
        let file = root.child("metadata.json").await.unwrap();
        let result = file.read().await;
        assert!(matches!(
            result,
            Err(SourceError::MaterializeTimeout { .. })
        ));
    }
}
