//! TestWatch Common Library
//!
//! Shared types, configuration, and utilities for the TestWatch service.

pub mod config;
pub mod error;
pub mod logbuf;
pub mod types;

// Re-export commonly used types
pub use config::{CheckConfig, RunnerConfig, ServerConfig, SiteConfig, WatchConfig};
pub use error::{Error, Result};
pub use logbuf::LogBuffer;
pub use types::*;

/// TestWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
