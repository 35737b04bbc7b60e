//! Google Drive backend for the source layer.
//!
//! Rate-sensitive: requests run behind the concurrency gate and resolved
//! path segments are cached, on top of the shared retry policy.

pub mod connector;
pub mod types;

pub use connector::GoogleDriveSource;
