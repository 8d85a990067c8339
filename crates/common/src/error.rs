//! Error types for TestWatch

use thiserror::Error;

/// Result type alias using TestWatch Error
pub type Result<T> = std::result::Result<T, Error>;

/// TestWatch error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {kind} with key {key}")]
    NotFound { kind: String, key: String },

    #[error("Runner error: {0}")]
    Runner(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
