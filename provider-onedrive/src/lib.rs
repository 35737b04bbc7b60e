//! OneDrive backend for the source layer.
//!
//! Uses Graph path addressing for child lookup and runs under the shared
//! retry policy without a concurrency gate.

pub mod connector;
pub mod types;

pub use connector::OneDriveSource;
