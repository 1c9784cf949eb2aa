// Gazette — Store error types
//
// Messages carry the password hash at most. The encrypted DEK, the salt and
// the database key never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An escrow entry already exists for password hash {password_hash}")]
    DuplicateKey { password_hash: String },

    #[error("Escrow store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Escrow store is closed")]
    Closed,

    #[error("Invalid input: {0} must not be empty")]
    InvalidInput(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
