// Gazette — Escrow Store Module
//
// Encrypted key-escrow storage using SQLCipher. One table maps a password
// hash to its encrypted DEK and salt; deletes overwrite freed pages.

mod clock;
mod db;
mod error;
mod models;
mod repository;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use db::Database;
pub use error::StoreError;
pub use models::{EntrySummary, EscrowEntry};
pub use repository::{EscrowRepository, EscrowStore};
