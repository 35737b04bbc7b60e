//! HTTP plumbing shared by the remote drive adapters.
//!
//! The adapters talk to [`HttpClient`] rather than a concrete client so
//! tests can substitute canned responses; [`ReqwestClient`] is the
//! production implementation.

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Body chunks of a streaming download.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// Request builder.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Response with the body fully buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Convert a non-2xx response into the error taxonomy.
    pub fn into_result(self) -> Result<HttpResponse> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SourceError::from_status(self.status, self.text()))
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute and hand the response body back as a chunk stream, so large
    /// downloads never sit fully buffered in memory. A non-2xx response is
    /// buffered and mapped into the error taxonomy instead.
    async fn execute_streaming(&self, request: HttpRequest) -> Result<ByteStream>;
}

/// Production [`HttpClient`] over a shared reqwest client.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_streaming(&self, request: HttpRequest) -> Result<ByteStream> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.bytes().await.unwrap_or_default();
            return Err(SourceError::from_status(
                status,
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        Ok(Box::pin(response.bytes_stream().map_err(SourceError::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://example.com/files")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
    }

    #[test]
    fn test_response_into_result() {
        let ok = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(b"{}"),
        };
        assert!(ok.into_result().is_ok());

        let unauthorized = HttpResponse {
            status: 401,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(matches!(
            unauthorized.into_result(),
            Err(SourceError::Unauthorized)
        ));
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(br#"{"name":"a"}"#),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["name"], "a");
    }
}
