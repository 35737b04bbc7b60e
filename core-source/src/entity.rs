//! The backend-agnostic entity abstraction the importer works against.
//!
//! An entity is a file or directory in the mirrored tree. Every backend
//! (local filesystem, remote drives, the in-memory test source) exposes the
//! same four operations, so the importer never knows which backend it is
//! reading.

use crate::error::{Result, SourceError};
use crate::http::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Backend identifier (remote file id, or the name for local sources)
    pub id: String,
    pub name: String,
    pub is_dir: bool,
}

/// A file or directory inside a source.
#[async_trait]
pub trait SourceEntity: Send + Sync {
    /// Display name of this entity.
    fn name(&self) -> &str;

    /// Look up a direct child by name.
    async fn child(&self, name: &str) -> Result<Box<dyn SourceEntity>>;

    /// Read the full content of a file entity.
    async fn read(&self) -> Result<Bytes>;

    /// List the children of a directory entity.
    async fn list(&self) -> Result<Vec<EntryMeta>>;

    /// Copy a file entity to a local destination path. Partial output is
    /// removed on failure.
    ///
    /// Backends with a cheaper path than read-then-write override this.
    async fn copy_to(&self, dest: &Path) -> Result<()> {
        let content = self.read().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::write(dest, &content).await {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Write a download stream into `dest` chunk by chunk, creating parent
/// directories. Partial output is removed on failure.
pub async fn write_stream(mut stream: ByteStream, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let write = async {
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<(), SourceError>(())
    };
    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e);
    }
    Ok(())
}

/// Walk a slash-free segment path down from a root entity.
pub async fn resolve_path(
    root: &dyn SourceEntity,
    segments: &[&str],
) -> Result<Box<dyn SourceEntity>> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| SourceError::InvalidResponse("empty entity path".to_string()))?;
    let mut current = root.child(first).await?;
    for segment in rest {
        current = current.child(segment).await?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_write_stream_concatenates_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("a.bin");
        let chunks: ByteStream = Box::pin(stream::iter([
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));

        write_stream(chunks, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_write_stream_failure_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        let chunks: ByteStream = Box::pin(stream::iter([
            Ok(Bytes::from_static(b"partial")),
            Err(SourceError::Network("connection reset".into())),
        ]));

        assert!(write_stream(chunks, &dest).await.is_err());
        assert!(!dest.exists());
    }
}
