//! Google Drive source adapter.
//!
//! Implements the entity abstraction over the Drive API v3. Drive is
//! addressed by file id, so child lookup is a `q` query scoped to the
//! parent; resolved ids go through the shared path cache to avoid repeating
//! the same traversal queries. Every request runs under the retry runner
//! with the concurrency gate, since Drive throttles sustained bursts.

use crate::types::{DriveFile, FileListResponse};
use async_trait::async_trait;
use bytes::Bytes;
use core_auth::TokenProvider;
use core_source::entity::{write_stream, EntryMeta, SourceEntity};
use core_source::error::{Result, SourceError};
use core_source::http::{ByteStream, HttpClient, HttpRequest};
use core_source::limiter::{GateConfig, RequestGate};
use core_source::path_cache::PathCache;
use core_source::retry::{Resilient, RetryPolicy};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Maximum results per listing page (Drive API limit).
const PAGE_SIZE: u32 = 1000;

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

struct DriveShared {
    http: Arc<dyn HttpClient>,
    runner: Resilient,
    path_cache: PathCache,
}

/// Google Drive source. Entities created from it share one HTTP client,
/// retry runner, gate, and path cache.
pub struct GoogleDriveSource {
    shared: Arc<DriveShared>,
}

impl GoogleDriveSource {
    pub fn new(http: Arc<dyn HttpClient>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_config(
            http,
            tokens,
            RetryPolicy::default(),
            GateConfig::default(),
        )
    }

    pub fn with_config(
        http: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenProvider>,
        policy: RetryPolicy,
        gate: GateConfig,
    ) -> Self {
        let gate = Arc::new(RequestGate::new(gate));
        let runner = Resilient::new(policy, tokens).with_gate(gate);
        Self {
            shared: Arc::new(DriveShared {
                http,
                runner,
                path_cache: PathCache::default(),
            }),
        }
    }

    /// Entity for the library's root folder id.
    pub fn root_entity(&self, root_id: &str) -> Box<dyn SourceEntity> {
        Box::new(DriveEntity {
            shared: self.shared.clone(),
            id: root_id.to_string(),
            name: String::new(),
        })
    }
}

impl DriveShared {
    async fn get_json<T: DeserializeOwned>(&self, op: &str, url: &str) -> Result<T> {
        let response = self
            .runner
            .run(op, |token| {
                let request = HttpRequest::get(url)
                    .bearer_token(token)
                    .header("Accept", "application/json")
                    .timeout(REQUEST_TIMEOUT);
                let http = self.http.clone();
                async move { http.execute(request).await?.into_result() }
            })
            .await?;
        response.json()
    }

    async fn get_bytes(&self, op: &str, url: &str) -> Result<Bytes> {
        let response = self
            .runner
            .run(op, |token| {
                let request = HttpRequest::get(url)
                    .bearer_token(token)
                    .timeout(DOWNLOAD_TIMEOUT);
                let http = self.http.clone();
                async move { http.execute(request).await?.into_result() }
            })
            .await?;
        Ok(response.body)
    }

    /// Open a download as a chunk stream. Only the request itself is
    /// retried; a failure mid-stream surfaces to the caller.
    async fn stream_bytes(&self, op: &str, url: &str) -> Result<ByteStream> {
        self.runner
            .run(op, |token| {
                let request = HttpRequest::get(url)
                    .bearer_token(token)
                    .timeout(DOWNLOAD_TIMEOUT);
                let http = self.http.clone();
                async move { http.execute_streaming(request).await }
            })
            .await
    }

    async fn find_child(&self, parent_id: &str, name: &str) -> Result<DriveFile> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            parent_id,
            escape_query_value(name)
        );
        let url = format!(
            "{}/files?q={}&fields=files(id,name,mimeType)&pageSize=2",
            DRIVE_API_BASE,
            urlencoding::encode(&query)
        );
        let response: FileListResponse = self.get_json("drive.find_child", &url).await?;
        response
            .files
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(format!("{name} in {parent_id}")))
    }
}

struct DriveEntity {
    shared: Arc<DriveShared>,
    id: String,
    name: String,
}

#[async_trait]
impl SourceEntity for DriveEntity {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(parent_id = %self.id, name = %name))]
    async fn child(&self, name: &str) -> Result<Box<dyn SourceEntity>> {
        if let Some(id) = self.shared.path_cache.get(&self.id, name) {
            debug!(child_id = %id, "path cache hit");
            return Ok(Box::new(DriveEntity {
                shared: self.shared.clone(),
                id,
                name: name.to_string(),
            }));
        }

        let file = self.shared.find_child(&self.id, name).await?;
        self.shared.path_cache.insert(&self.id, name, &file.id);
        Ok(Box::new(DriveEntity {
            shared: self.shared.clone(),
            id: file.id,
            name: file.name,
        }))
    }

    #[instrument(skip(self), fields(file_id = %self.id))]
    async fn read(&self) -> Result<Bytes> {
        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, self.id);
        self.shared.get_bytes("drive.read", &url).await
    }

    #[instrument(skip(self, dest), fields(file_id = %self.id))]
    async fn copy_to(&self, dest: &Path) -> Result<()> {
        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, self.id);
        let stream = self.shared.stream_bytes("drive.copy_to", &url).await?;
        write_stream(stream, dest).await
    }

    #[instrument(skip(self), fields(folder_id = %self.id))]
    async fn list(&self) -> Result<Vec<EntryMeta>> {
        let query = format!("'{}' in parents and trashed = false", self.id);
        let base_url = format!(
            "{}/files?q={}&fields={}&pageSize={}",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            LIST_FIELDS,
            PAGE_SIZE
        );

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = match &page_token {
                Some(token) => format!("{}&pageToken={}", base_url, urlencoding::encode(token)),
                None => base_url.clone(),
            };
            let response: FileListResponse = self.shared.get_json("drive.list", &url).await?;
            for file in response.files {
                entries.push(EntryMeta {
                    is_dir: file.is_folder(),
                    id: file.id,
                    name: file.name,
                });
            }
            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(count = entries.len(), "listed folder");
        Ok(entries)
    }
}

/// Escape a value for interpolation into a Drive `q` expression.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
