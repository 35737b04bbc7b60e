//! In-memory source used by tests and local development.
//!
//! Holds a flat map of slash-separated paths to file contents; directories
//! are implied. Reads can be made to fail a fixed number of times to
//! exercise the resilience and isolation paths, and every successful read
//! is logged.

use crate::entity::{EntryMeta, SourceEntity};
use crate::error::{Result, SourceError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    files: Mutex<BTreeMap<String, Bytes>>,
    fail_reads: Mutex<HashMap<String, usize>>,
    read_log: Mutex<Vec<String>>,
}

/// Shared handle to an in-memory file tree.
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Inner>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: &str, content: impl Into<Bytes>) {
        let mut files = self.inner.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.to_string(), content.into());
    }

    pub fn put_json<T: Serialize>(&self, path: &str, value: &T) {
        let bytes = serde_json::to_vec(value).expect("serializable test fixture");
        self.put_file(path, bytes);
    }

    pub fn remove_file(&self, path: &str) {
        let mut files = self.inner.files.lock().unwrap_or_else(|e| e.into_inner());
        files.remove(path);
    }

    /// Make the next `times` reads of `path` fail with a network error.
    pub fn fail_reads(&self, path: &str, times: usize) {
        let mut fails = self
            .inner
            .fail_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        fails.insert(path.to_string(), times);
    }

    /// Paths read so far, in order.
    pub fn read_log(&self) -> Vec<String> {
        self.inner
            .read_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Root directory entity.
    pub fn root(&self) -> Box<dyn SourceEntity> {
        Box::new(MemoryEntity {
            inner: self.inner.clone(),
            path: String::new(),
            name: String::new(),
        })
    }
}

struct MemoryEntity {
    inner: Arc<Inner>,
    /// Slash-separated path, empty for the root
    path: String,
    name: String,
}

impl MemoryEntity {
    fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    fn exists(&self, path: &str) -> bool {
        let files = self.inner.files.lock().unwrap_or_else(|e| e.into_inner());
        let dir_prefix = format!("{path}/");
        files
            .keys()
            .any(|key| key == path || key.starts_with(&dir_prefix))
    }
}

#[async_trait]
impl SourceEntity for MemoryEntity {
    fn name(&self) -> &str {
        &self.name
    }

    async fn child(&self, name: &str) -> Result<Box<dyn SourceEntity>> {
        let path = self.child_path(name);
        if !self.exists(&path) {
            return Err(SourceError::NotFound(path));
        }
        Ok(Box::new(MemoryEntity {
            inner: self.inner.clone(),
            path,
            name: name.to_string(),
        }))
    }

    async fn read(&self) -> Result<Bytes> {
        {
            let mut fails = self
                .inner
                .fail_reads
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(remaining) = fails.get_mut(&self.path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::Network(format!(
                        "injected failure reading {}",
                        self.path
                    )));
                }
            }
        }

        let files = self.inner.files.lock().unwrap_or_else(|e| e.into_inner());
        let content = files
            .get(&self.path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(self.path.clone()))?;
        self.inner
            .read_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.path.clone());
        Ok(content)
    }

    async fn list(&self) -> Result<Vec<EntryMeta>> {
        let files = self.inner.files.lock().unwrap_or_else(|e| e.into_inner());
        let prefix = if self.path.is_empty() {
            String::new()
        } else {
            format!("{}/", self.path)
        };

        let mut entries: BTreeMap<String, bool> = BTreeMap::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries.insert(dir.to_string(), true);
                }
                None => {
                    entries.insert(rest.to_string(), false);
                }
            }
        }

        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| EntryMeta {
                id: name.clone(),
                name,
                is_dir,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::resolve_path;

    #[tokio::test]
    async fn test_tree_navigation() {
        let source = MemorySource::new();
        source.put_file("metadata.json", &b"{}"[..]);
        source.put_file("images/a.info/metadata.json", &b"{\"id\":\"a\"}"[..]);

        let root = source.root();
        let entries = root.list().await.unwrap();
        assert_eq!(
            entries,
            vec![
                EntryMeta {
                    id: "images".to_string(),
                    name: "images".to_string(),
                    is_dir: true
                },
                EntryMeta {
                    id: "metadata.json".to_string(),
                    name: "metadata.json".to_string(),
                    is_dir: false
                },
            ]
        );

        let nested = resolve_path(root.as_ref(), &["images", "a.info", "metadata.json"])
            .await
            .unwrap();
        assert_eq!(nested.read().await.unwrap(), Bytes::from_static(b"{\"id\":\"a\"}"));
        assert_eq!(source.read_log(), vec!["images/a.info/metadata.json"]);
    }

    #[tokio::test]
    async fn test_missing_child() {
        let source = MemorySource::new();
        source.put_file("a.txt", &b"x"[..]);
        let root = source.root();
        assert!(matches!(
            root.child("b.txt").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_read_failures_are_consumed() {
        let source = MemorySource::new();
        source.put_file("a.txt", &b"x"[..]);
        source.fail_reads("a.txt", 2);

        let root = source.root();
        let file = root.child("a.txt").await.unwrap();
        assert!(matches!(file.read().await, Err(SourceError::Network(_))));
        assert!(matches!(file.read().await, Err(SourceError::Network(_))));
        assert_eq!(file.read().await.unwrap(), Bytes::from_static(b"x"));
    }
}
