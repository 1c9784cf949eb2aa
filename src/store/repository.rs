// Gazette — Escrow Store Repository
//
// CRUD over the encrypted `gazette_entries` table. `insert` refuses an
// existing key and `update` refuses a missing one, so overwriting an escrowed
// DEK is always an explicit choice of the caller. Nothing is cached between
// calls: every operation reads or writes the row by key.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{ffi, params, ErrorCode, OptionalExtension};

use crate::config::StoreConfig;

use super::clock::{Clock, SystemClock};
use super::db::Database;
use super::models::{EntrySummary, EscrowEntry};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over escrow storage operations.
pub trait EscrowRepository: Send + Sync {
    /// Escrow a new DEK. Fails with `DuplicateKey` if the hash is taken.
    fn insert(&self, password_hash: &str, encrypted_dek: &str, salt: &str)
        -> Result<(), StoreError>;

    /// Look up an entry. Absence is `Ok(None)`, not an error.
    fn get(&self, password_hash: &str) -> Result<Option<EscrowEntry>, StoreError>;

    /// Replace the DEK, salt and metadata of an existing entry and bump its
    /// version. Returns false (and writes nothing) if the hash is unknown.
    fn update(
        &self,
        password_hash: &str,
        encrypted_dek: &str,
        salt: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool, StoreError>;

    /// Securely erase an entry. Returns true if it existed.
    fn delete(&self, password_hash: &str) -> Result<bool, StoreError>;

    /// All entries, newest `created_at` first. No key material.
    fn list_all(&self) -> Result<Vec<EntrySummary>, StoreError>;

    /// Erase every entry whose `updated_at` is older than `now - max_age`.
    /// Returns how many were erased.
    fn purge_older_than(&self, max_age: Duration) -> Result<usize, StoreError>;

    /// Number of escrowed entries.
    fn count(&self) -> Result<u64, StoreError>;

    /// Release the storage handle. Idempotent.
    fn close(&self) -> Result<(), StoreError>;
}

// ─── SQLCipher Implementation ────────────────────────────────────────────────

/// The escrow store: one encrypted connection plus a time source.
pub struct EscrowStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl EscrowStore {
    /// Open the store with the system clock.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the store with a caller-provided time source.
    pub fn open_with_clock(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(config)?,
            clock,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_closed()
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EscrowEntry> {
        let metadata_json: Option<String> = row.get(6)?;
        let metadata = metadata_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(EscrowEntry::new(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            metadata,
        ))
    }

    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntrySummary> {
        Ok(EntrySummary {
            password_hash: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            version: row.get(3)?,
        })
    }
}

fn require(value: &str, field: &'static str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidInput(field));
    }
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

impl EscrowRepository for EscrowStore {
    fn insert(
        &self,
        password_hash: &str,
        encrypted_dek: &str,
        salt: &str,
    ) -> Result<(), StoreError> {
        require(password_hash, "password_hash")?;
        require(encrypted_dek, "encrypted_dek")?;
        require(salt, "salt")?;

        let now = self.clock.now_millis();

        self.db.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO gazette_entries
                    (password_hash, encrypted_dek, salt, created_at, updated_at, version, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?4, 1, NULL)",
                params![password_hash, encrypted_dek, salt, now],
            );

            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateKey {
                    password_hash: password_hash.to_string(),
                }),
                Err(e) => Err(StoreError::Database(e)),
            }
        })?;

        tracing::info!(password_hash = %password_hash, "Escrow entry created");
        Ok(())
    }

    fn get(&self, password_hash: &str) -> Result<Option<EscrowEntry>, StoreError> {
        if password_hash.is_empty() {
            return Ok(None);
        }

        self.db.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT password_hash, encrypted_dek, salt, created_at, updated_at,
                            version, metadata
                     FROM gazette_entries WHERE password_hash = ?1",
                    params![password_hash],
                    Self::row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
    }

    fn update(
        &self,
        password_hash: &str,
        encrypted_dek: &str,
        salt: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool, StoreError> {
        require(encrypted_dek, "encrypted_dek")?;
        require(salt, "salt")?;
        if password_hash.is_empty() {
            return Ok(false);
        }

        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        let now = self.clock.now_millis();

        // MAX() keeps updated_at monotonic if the wall clock steps backwards.
        let affected = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE gazette_entries
                 SET encrypted_dek = ?1,
                     salt          = ?2,
                     metadata      = ?3,
                     updated_at    = MAX(updated_at, ?4),
                     version       = version + 1
                 WHERE password_hash = ?5",
                params![encrypted_dek, salt, metadata_json, now, password_hash],
            )?)
        })?;

        if affected > 0 {
            tracing::info!(password_hash = %password_hash, "Escrow entry updated");
        } else {
            tracing::debug!(password_hash = %password_hash, "Update skipped, no such entry");
        }

        Ok(affected > 0)
    }

    fn delete(&self, password_hash: &str) -> Result<bool, StoreError> {
        if password_hash.is_empty() {
            return Ok(false);
        }

        let affected = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM gazette_entries WHERE password_hash = ?1",
                params![password_hash],
            )?)
        })?;

        if affected > 0 {
            tracing::info!(password_hash = %password_hash, "Escrow entry deleted");
        }

        Ok(affected > 0)
    }

    fn list_all(&self) -> Result<Vec<EntrySummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT password_hash, created_at, updated_at, version
                 FROM gazette_entries
                 ORDER BY created_at DESC, password_hash ASC",
            )?;

            let rows = stmt.query_map([], Self::row_to_summary)?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        })
    }

    fn purge_older_than(&self, max_age: Duration) -> Result<usize, StoreError> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(max_age_ms);

        let purged = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM gazette_entries WHERE updated_at < ?1",
                params![cutoff],
            )?)
        })?;

        if purged > 0 {
            tracing::info!(purged, cutoff, "Purged stale escrow entries");
        } else {
            tracing::debug!(cutoff, "Purge found no stale escrow entries");
        }

        Ok(purged)
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT count(*) FROM gazette_entries", [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
    }

    fn close(&self) -> Result<(), StoreError> {
        self.db.close()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
