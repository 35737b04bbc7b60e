use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No credentials available for backend {0}")]
    NotAuthenticated(String),

    #[error("Token refresh timed out")]
    RefreshTimeout,
}

pub type Result<T> = std::result::Result<T, AuthError>;
