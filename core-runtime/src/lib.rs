//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the library mirror core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other modules depend on.
//! It establishes the logging conventions and event broadcasting mechanisms
//! used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, LibraryEvent, SettingsEvent, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
