//! # Derived-Value Cache
//!
//! Cache for values derived from store state, such as resolved folder
//! covers. Entries carry a fresh/stale flag, computations are deduplicated
//! per key, and a background task keeps the cache consistent by reacting to
//! sync, library, and settings events.

pub mod cache;
pub mod invalidation;

pub use cache::{CachedValue, DerivedCache, Freshness};
pub use invalidation::{apply, folder_key, spawn_invalidation};
