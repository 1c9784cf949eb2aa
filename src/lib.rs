// Gazette — Library root
//
// Re-exports the escrow store, its configuration, the UDS gateway, the
// purge sweep and the CLI.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;
pub mod sweep;

pub use error::{GazetteError, Result};
