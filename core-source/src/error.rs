use thiserror::Error;

/// How the resilience layer should react to a failed source operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retrying cannot help; surface immediately
    Fatal,
    /// Transient condition; back off and retry
    Transient,
    /// Credentials rejected; invalidate the cached token, then retry
    Unauthorized,
}

/// Errors surfaced by source backends and the resilience layer around them.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("backend error (status {status}): {message}")]
    Backend { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] core_auth::AuthError),

    #[error("placeholder did not materialize within {timeout_secs}s: {path}")]
    MaterializeTimeout { path: String, timeout_secs: u64 },

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SourceError>,
    },
}

impl SourceError {
    /// Map an HTTP status with its body into the error taxonomy.
    ///
    /// A plain 403 is a terminal permission failure; Drive reports quota
    /// exhaustion as 403 with a `rateLimitExceeded` reason in the body, and
    /// only that flavor is treated as throttling.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => SourceError::Unauthorized,
            429 => SourceError::RateLimited,
            403 if is_rate_limit_body(&message) => SourceError::RateLimited,
            404 => SourceError::NotFound(message),
            _ => SourceError::Backend { status, message },
        }
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            SourceError::Unauthorized => RetryClass::Unauthorized,
            SourceError::RateLimited | SourceError::Network(_) => RetryClass::Transient,
            SourceError::Backend { status, .. } if *status >= 500 => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

fn is_rate_limit_body(body: &str) -> bool {
    body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded")
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::InvalidResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            SourceError::from_status(401, ""),
            SourceError::Unauthorized
        ));
        assert!(matches!(
            SourceError::from_status(429, ""),
            SourceError::RateLimited
        ));
        assert!(matches!(
            SourceError::from_status(404, "x"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            SourceError::from_status(403, "insufficient scope"),
            SourceError::Backend { status: 403, .. }
        ));
        assert!(matches!(
            SourceError::from_status(503, "down"),
            SourceError::Backend { status: 503, .. }
        ));
    }

    #[test]
    fn test_retry_classes() {
        assert_eq!(
            SourceError::Unauthorized.retry_class(),
            RetryClass::Unauthorized
        );
        assert_eq!(SourceError::RateLimited.retry_class(), RetryClass::Transient);
        assert_eq!(
            SourceError::Network("reset".into()).retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            SourceError::from_status(500, "").retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            SourceError::from_status(400, "").retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(
            SourceError::NotFound("x".into()).retry_class(),
            RetryClass::Fatal
        );
    }

    #[test]
    fn test_forbidden_is_terminal_unless_quota_flavored() {
        assert_eq!(
            SourceError::from_status(403, "insufficient scope").retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(
            SourceError::from_status(
                403,
                r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#,
            )
            .retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            SourceError::from_status(403, r#"{"error":{"errors":[{"reason":"rateLimitExceeded"}]}}"#)
                .retry_class(),
            RetryClass::Transient
        );
    }
}
