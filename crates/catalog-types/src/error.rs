//! Error types shared across the collection index.

use thiserror::Error;

/// Unified error type for catalog domain operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encoded value did not match the expected layout
    #[error("Invalid encoding: {0}")]
    Encoding(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
