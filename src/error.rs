// Gazette — Top-level error types
//
// Aggregates errors from the config and store modules into a single
// error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Gazette operations.
#[derive(Debug, Error)]
pub enum GazetteError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GazetteError>;
