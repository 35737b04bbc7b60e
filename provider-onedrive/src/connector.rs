//! OneDrive source adapter over the Microsoft Graph API.
//!
//! Graph supports path addressing relative to an item
//! (`/items/{id}:/{name}`), so child lookup is a single request and needs
//! no path cache. Graph's throttling is also far more permissive than
//! Drive's, so requests run under the retry policy alone, without a gate.

use crate::types::{ChildrenResponse, DriveItem};
use async_trait::async_trait;
use bytes::Bytes;
use core_auth::TokenProvider;
use core_source::entity::{write_stream, EntryMeta, SourceEntity};
use core_source::error::{Result, SourceError};
use core_source::http::{ByteStream, HttpClient, HttpRequest};
use core_source::retry::{Resilient, RetryPolicy};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0/me/drive";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

struct GraphShared {
    http: Arc<dyn HttpClient>,
    runner: Resilient,
}

/// OneDrive source. Entities created from it share one HTTP client and
/// retry runner.
pub struct OneDriveSource {
    shared: Arc<GraphShared>,
}

impl OneDriveSource {
    pub fn new(http: Arc<dyn HttpClient>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_policy(http, tokens, RetryPolicy::default())
    }

    pub fn with_policy(
        http: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(GraphShared {
                http,
                runner: Resilient::new(policy, tokens),
            }),
        }
    }

    /// Entity for the library's root item id.
    pub fn root_entity(&self, root_id: &str) -> Box<dyn SourceEntity> {
        Box::new(OneDriveEntity {
            shared: self.shared.clone(),
            id: root_id.to_string(),
            name: String::new(),
        })
    }
}

impl GraphShared {
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
}

struct OneDriveEntity {
    shared: Arc<GraphShared>,
    id: String,
    name: String,
}

#[async_trait]
impl SourceEntity for OneDriveEntity {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(parent_id = %self.id, name = %name))]
    async fn child(&self, name: &str) -> Result<Box<dyn SourceEntity>> {
        let url = format!(
            "{}/items/{}:/{}",
            GRAPH_API_BASE,
            self.id,
            urlencoding::encode(name)
        );
        let item: DriveItem = match self.shared.get_json("onedrive.child", &url).await {
            Ok(item) => item,
            Err(SourceError::NotFound(_)) => {
                return Err(SourceError::NotFound(format!("{name} in {}", self.id)))
            }
            Err(e) => return Err(e),
        };
        Ok(Box::new(OneDriveEntity {
            shared: self.shared.clone(),
            id: item.id,
            name: item.name,
        }))
    }

    #[instrument(skip(self), fields(item_id = %self.id))]
    async fn read(&self) -> Result<Bytes> {
        let url = format!("{}/items/{}/content", GRAPH_API_BASE, self.id);
        let response = self
            .shared
            .runner
            .run("onedrive.read", |token| {
                let request = HttpRequest::get(&url)
                    .bearer_token(token)
                    .timeout(DOWNLOAD_TIMEOUT);
                let http = self.shared.http.clone();
                async move { http.execute(request).await?.into_result() }
            })
            .await?;
        Ok(response.body)
    }

    #[instrument(skip(self, dest), fields(item_id = %self.id))]
    async fn copy_to(&self, dest: &Path) -> Result<()> {
        let url = format!("{}/items/{}/content", GRAPH_API_BASE, self.id);
        let stream = self.shared.stream_bytes("onedrive.copy_to", &url).await?;
        write_stream(stream, dest).await
    }

    #[instrument(skip(self), fields(item_id = %self.id))]
    async fn list(&self) -> Result<Vec<EntryMeta>> {
        let mut url = format!("{}/items/{}/children", GRAPH_API_BASE, self.id);
        let mut entries = Vec::new();
        loop {
            let response: ChildrenResponse =
                self.shared.get_json("onedrive.list", &url).await?;
            for item in response.value {
                entries.push(EntryMeta {
                    is_dir: item.is_folder(),
                    id: item.id,
                    name: item.name,
                });
            }
            match response.next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        debug!(count = entries.len(), "listed folder");
        Ok(entries)
    }
}
