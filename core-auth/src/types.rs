use serde::{Deserialize, Serialize};

/// A bearer token with its expiry, as produced by a [`crate::TokenSource`].
///
/// # Examples
///
/// ```
/// use core_auth::BearerTokens;
///
/// let tokens = BearerTokens::new("access".to_string(), 3600);
/// assert!(!tokens.is_expired_with_buffer(300));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// When the access token expires (UTC)
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl BearerTokens {
    /// Create a token valid for `expires_in` seconds from now.
    pub fn new(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in),
        }
    }

    /// Check if the token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(0)
    }

    /// Check if the token is expired or will expire within the buffer
    /// period. The buffer ensures tokens are refreshed before they actually
    /// lapse mid-request.
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        chrono::Utc::now() + chrono::Duration::seconds(buffer_seconds) >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_not_expired() {
        let tokens = BearerTokens::new("t".to_string(), 600);
        assert!(!tokens.is_expired());
        assert!(!tokens.is_expired_with_buffer(60));
    }

    #[test]
    fn test_buffer_triggers_early_expiry() {
        let tokens = BearerTokens::new("t".to_string(), 60);
        assert!(!tokens.is_expired());
        assert!(tokens.is_expired_with_buffer(300));
    }

    #[test]
    fn test_already_expired() {
        let tokens = BearerTokens::new("t".to_string(), -10);
        assert!(tokens.is_expired());
    }
}
