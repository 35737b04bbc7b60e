//! Token provider trait and the caching implementation used by the
//! resilience layer.

use crate::error::{AuthError, Result};
use crate::types::BearerTokens;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Buffer before token expiration that triggers a refresh (5 minutes).
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Ceiling on a single refresh round-trip.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-backend credential provider consumed by the remote adapters.
///
/// `bearer_token` always returns a currently valid token, refreshing
/// internally if needed. `invalidate` discards the cached token so the next
/// call refreshes; the retry wrapper calls it after an unauthorized
/// response before the next attempt.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;

    async fn invalidate(&self);
}

/// Source of fresh tokens, typically an OAuth refresh-grant round-trip
/// owned by the host application.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<BearerTokens>;
}

/// [`TokenProvider`] that caches tokens from a [`TokenSource`] and refreshes
/// them before expiry.
///
/// A single internal lock serializes refreshes so concurrent callers never
/// trigger more than one refresh round-trip.
pub struct CachedTokenProvider {
    backend: String,
    source: Arc<dyn TokenSource>,
    state: Mutex<Option<BearerTokens>>,
}

impl CachedTokenProvider {
    pub fn new(backend: impl Into<String>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            backend: backend.into(),
            source,
            state: Mutex::new(None),
        }
    }

    async fn refresh_locked(&self, state: &mut Option<BearerTokens>) -> Result<String> {
        info!(backend = %self.backend, "refreshing bearer token");

        let tokens = tokio::time::timeout(REFRESH_TIMEOUT, self.source.fetch())
            .await
            .map_err(|_| {
                warn!(backend = %self.backend, "token refresh timed out");
                AuthError::RefreshTimeout
            })??;

        let access = tokens.access_token.clone();
        *state = Some(tokens);
        Ok(access)
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if let Some(tokens) = state.as_ref() {
            if !tokens.is_expired_with_buffer(TOKEN_REFRESH_BUFFER_SECS) {
                debug!(backend = %self.backend, "cached token still valid");
                return Ok(tokens.access_token.clone());
            }
            info!(backend = %self.backend, "cached token expired or expiring soon");
        }

        self.refresh_locked(&mut state).await
    }

    async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.take().is_some() {
            info!(backend = %self.backend, "bearer token invalidated");
        }
    }
}

/// Fixed-token provider for tests and local development.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn invalidate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: AtomicUsize,
        expires_in: i64,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self) -> Result<BearerTokens> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(BearerTokens::new(format!("token-{}", n), self.expires_in))
        }
    }

    #[tokio::test]
    async fn test_token_is_cached_across_calls() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let provider = CachedTokenProvider::new("drive", source.clone());

        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let provider = CachedTokenProvider::new("drive", source.clone());

        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        provider.invalidate().await;
        assert_eq!(provider.bearer_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_expiring_token_refreshes() {
        // Expires inside the refresh buffer, so every call refreshes.
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            expires_in: 10,
        });
        let provider = CachedTokenProvider::new("drive", source.clone());

        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        assert_eq!(provider.bearer_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_concurrent_callers_single_refresh() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let provider = Arc::new(CachedTokenProvider::new("drive", source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.bearer_token().await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
