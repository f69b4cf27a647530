//! Error types for Jukebird

use thiserror::Error;

/// Main error type for Jukebird operations
#[derive(Debug, Error)]
pub enum JukebirdError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio catalog error (fatal at startup)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// Voice session error
    #[error("Voice error: {0}")]
    Voice(String),

    /// Voice transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// A component that may only be initialized once was initialized again
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Not found error (generic)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using [`JukebirdError`]
pub type Result<T> = std::result::Result<T, JukebirdError>;
