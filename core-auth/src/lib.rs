//! # Credential Provider Module
//!
//! Bearer-token acquisition for the remote drive backends.
//!
//! ## Overview
//!
//! Interactive credential acquisition (consent screens, device flows) is the
//! host application's job. This crate only models what the sync engine
//! needs: a [`TokenProvider`] that always hands back a valid bearer token,
//! refreshing internally when the cached token is expired or has been
//! invalidated by an unauthorized response.

pub mod error;
pub mod provider;
pub mod types;

pub use error::{AuthError, Result};
pub use provider::{CachedTokenProvider, StaticTokenProvider, TokenProvider, TokenSource};
pub use types::BearerTokens;
