//! # Source Layer
//!
//! Backend-agnostic access to a library's content tree, plus the resilience
//! plumbing every remote backend shares:
//!
//! - [`entity`] defines the [`SourceEntity`] abstraction the importer
//!   traverses
//! - [`local`] implements it over the filesystem, hydrating cloud
//!   placeholder files on demand
//! - [`http`], [`retry`], [`limiter`], and [`path_cache`] carry the remote
//!   adapters: a mockable HTTP client, exponential-backoff retries with
//!   token invalidation, a spaced concurrency gate, and an LRU of path
//!   lookups
//! - [`memory`] is an in-memory source for tests

pub mod descriptor;
pub mod entity;
pub mod error;
pub mod http;
pub mod limiter;
pub mod local;
pub mod memory;
pub mod path_cache;
pub mod retry;

pub use descriptor::{BackendKind, SourceDescriptor};
pub use entity::{resolve_path, write_stream, EntryMeta, SourceEntity};
pub use error::{Result, RetryClass, SourceError};
pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
pub use limiter::{GateConfig, GatePass, RequestGate};
pub use local::{AlwaysMaterialized, LocalEntity, MaterializeConfig, Materializer};
pub use memory::MemorySource;
pub use path_cache::PathCache;
pub use retry::{Resilient, RetryPolicy};
