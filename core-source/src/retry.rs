//! Retry driver wrapping every remote source operation.
//!
//! Transient failures back off exponentially; unauthorized responses
//! invalidate the cached bearer token before the next attempt; fatal errors
//! surface immediately. A gate slot, when configured, is held only for the
//! duration of the request itself, never across a backoff sleep.

use crate::error::{Result, RetryClass, SourceError};
use crate::limiter::RequestGate;
use core_auth::TokenProvider;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before the attempt numbered `attempt` (zero-based), doubling
    /// each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Runs source operations under the retry policy, with optional gating.
pub struct Resilient {
    policy: RetryPolicy,
    gate: Option<Arc<RequestGate>>,
    tokens: Arc<dyn TokenProvider>,
}

impl Resilient {
    pub fn new(policy: RetryPolicy, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            policy,
            gate: None,
            tokens,
        }
    }

    pub fn with_gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Run `op` until it succeeds or the policy is exhausted.
    ///
    /// The closure receives a currently valid bearer token on every attempt.
    pub async fn run<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let token = self.tokens.bearer_token().await?;

            let result = match &self.gate {
                Some(gate) => {
                    let pass = gate.acquire().await;
                    let result = op(token).await;
                    drop(pass);
                    result
                }
                None => op(token).await,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match error.retry_class() {
                RetryClass::Fatal => return Err(error),
                RetryClass::Unauthorized => {
                    warn!(op = op_name, attempt, "unauthorized; invalidating token");
                    self.tokens.invalidate().await;
                }
                RetryClass::Transient => {
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure; backing off"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            if attempt >= self.policy.max_attempts {
                return Err(SourceError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::StaticTokenProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn resilient(max_attempts: u32) -> Resilient {
        Resilient::new(
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_secs(2),
            },
            Arc::new(StaticTokenProvider::new("tok")),
        )
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let calls = AtomicUsize::new(0);
        let result = resilient(5)
            .run("op", |token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(token, "tok");
                    Ok::<_, SourceError>(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = resilient(5)
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::NotFound("gone".into())) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_backoff_doubles() {
        let timestamps = Mutex::new(Vec::new());
        let result: Result<()> = resilient(4)
            .run("op", |_| {
                timestamps.lock().unwrap().push(tokio::time::Instant::now());
                async { Err(SourceError::Network("reset".into())) }
            })
            .await;
        assert!(matches!(
            result,
            Err(SourceError::RetriesExhausted { attempts: 4, .. })
        ));

        let timestamps = timestamps.lock().unwrap();
        assert_eq!(timestamps.len(), 4);
        let gaps: Vec<Duration> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps[0], Duration::from_secs(2));
        assert_eq!(gaps[1], Duration::from_secs(4));
        assert_eq!(gaps[2], Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let calls = AtomicUsize::new(0);
        let result = resilient(5)
            .run("op", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SourceError::RateLimited)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_and_retries() {
        struct TrackingProvider {
            invalidations: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl TokenProvider for TrackingProvider {
            async fn bearer_token(&self) -> core_auth::Result<String> {
                Ok(format!(
                    "token-{}",
                    self.invalidations.load(Ordering::SeqCst)
                ))
            }

            async fn invalidate(&self) {
                self.invalidations.fetch_add(1, Ordering::SeqCst);
            }
        }

        let provider = Arc::new(TrackingProvider {
            invalidations: AtomicUsize::new(0),
        });
        let runner = Resilient::new(
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
            },
            provider.clone(),
        );

        let result = runner
            .run("op", |token| async move {
                if token == "token-0" {
                    Err(SourceError::Unauthorized)
                } else {
                    Ok(token)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "token-1");
        assert_eq!(provider.invalidations.load(Ordering::SeqCst), 1);
    }
}
