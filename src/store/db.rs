// Gazette — SQLCipher Database Management
//
// Opens the encrypted store file, applies the cipher, journaling and
// secure-delete pragmas, and owns the single connection handle. The handle
// sits behind a mutex: every operation holds it for one statement, and
// `close()` takes it out so later operations see a closed store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::StoreConfig;

use super::StoreError;

/// Owner of the encrypted SQLCipher connection.
pub struct Database {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the encrypted store described by `config`.
    ///
    /// The key and cipher profile are applied before anything reads the file;
    /// a wrong key surfaces here as `StorageUnavailable`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::StorageUnavailable(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&config.path).map_err(|e| {
            StoreError::StorageUnavailable(format!(
                "cannot open {}: {}",
                config.path.display(),
                e
            ))
        })?;

        Self::apply_encryption(&conn, config)?;
        Self::apply_pragmas(&conn, config)?;
        Self::run_migrations(&conn)?;

        tracing::info!(
            path = %config.path.display(),
            cipher = %config.cipher,
            journal_mode = config.journal_mode.pragma_value(),
            "Escrow store opened"
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: config.path.clone(),
        })
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the open connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// Release the connection. Waits for the operation currently holding the
    /// handle; calling it again is a no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        // Shutdown must release the file even after a panicking operation.
        let mut guard = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match guard.take() {
            Some(conn) => {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
                tracing::info!(path = %self.path.display(), "Escrow store closed");
            }
            None => tracing::debug!("Escrow store already closed"),
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self.conn.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::StorageUnavailable("connection lock poisoned".to_string()))
    }

    /// Key the connection and check the key actually decrypts the file.
    fn apply_encryption(conn: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
        conn.pragma_update(None, "key", config.encryption_key())?;
        conn.pragma_update(None, "cipher_compatibility", config.cipher.compatibility())?;

        // With a wrong key this fails with "file is not a database".
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|_| {
            StoreError::StorageUnavailable(
                "invalid encryption key, or the file is corrupted / not a store".to_string(),
            )
        })?;

        Ok(())
    }

    fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
        if !mode.eq_ignore_ascii_case(config.journal_mode.pragma_value()) {
            tracing::warn!(
                requested = config.journal_mode.pragma_value(),
                actual = %mode,
                "Journal mode not applied as requested"
            );
        }

        conn.pragma_update(None, "secure_delete", "ON")?;
        let secure_delete: i64 =
            conn.pragma_query_value(None, "secure_delete", |row| row.get(0))?;
        if secure_delete != 1 {
            return Err(StoreError::StorageUnavailable(
                "secure_delete could not be enabled".to_string(),
            ));
        }

        conn.busy_timeout(config.busy_timeout)?;
        Ok(())
    }

    /// Create the entry table and its indexes. Safe on every startup.
    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS gazette_entries (
                password_hash   TEXT PRIMARY KEY,
                encrypted_dek   TEXT NOT NULL,
                salt            TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                version         INTEGER NOT NULL DEFAULT 1,
                metadata        TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_gazette_entries_created_at
                ON gazette_entries(created_at);

            CREATE INDEX IF NOT EXISTS idx_gazette_entries_updated_at
                ON gazette_entries(updated_at);

            CREATE INDEX IF NOT EXISTS idx_gazette_entries_version
                ON gazette_entries(version);
            ",
        )?;

        tracing::debug!("Escrow schema ready");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalMode;

    const KEY: &str = "gazette test passphrase 0123456789";

    fn config_in(dir: &tempfile::TempDir) -> StoreConfig {
        StoreConfig::new(dir.path().join("gazette.db"), KEY).unwrap()
    }

    #[test]
    fn test_open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&config_in(&dir)).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='gazette_entries'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1, "gazette_entries table should exist");
    }

    #[test]
    fn test_open_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("nested/data/gazette.db"), KEY).unwrap();
        let db = Database::open(&config).unwrap();
        assert!(db.path().exists());
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&config_in(&dir)).unwrap();
        assert!(db.with_conn(Database::run_migrations).is_ok());

        db.close().unwrap();
        assert!(
            Database::open(&config_in(&dir)).is_ok(),
            "Reopening a pre-existing store must succeed"
        );
    }

    #[test]
    fn test_secure_delete_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&config_in(&dir)).unwrap();
        let on: i64 = db
            .with_conn(|conn| Ok(conn.pragma_query_value(None, "secure_delete", |row| row.get(0))?))
            .unwrap();
        assert_eq!(on, 1);
    }

    #[test]
    fn test_journal_mode_follows_config() {
        let dir = tempfile::tempdir().unwrap();

        let wal = Database::open(&config_in(&dir)).unwrap();
        let mode: String = wal
            .with_conn(|conn| Ok(conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        wal.close().unwrap();

        let rollback =
            Database::open(&config_in(&dir).with_journal_mode(JournalMode::Delete)).unwrap();
        let mode: String = rollback
            .with_conn(|conn| Ok(conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "delete");
    }

    #[test]
    fn test_wrong_key_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");

        {
            let db = Database::open(&StoreConfig::new(&path, KEY).unwrap()).unwrap();
            db.close().unwrap();
        }

        let wrong = StoreConfig::new(&path, "definitely not the key").unwrap();
        match Database::open(&wrong) {
            Err(StoreError::StorageUnavailable(msg)) => {
                assert!(!msg.contains(KEY), "error must not echo the key");
            }
            Err(other) => panic!("Expected StorageUnavailable, got {:?}", other),
            Ok(_) => panic!("Opening with the wrong key must fail"),
        }
    }

    #[test]
    fn test_file_is_not_plaintext_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let db = Database::open(&config).unwrap();
        db.close().unwrap();

        let bytes = std::fs::read(&config.path).unwrap();
        assert!(
            !bytes.starts_with(b"SQLite format 3\0"),
            "An encrypted store must not carry the plaintext SQLite header"
        );
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_use() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&config_in(&dir)).unwrap();

        assert!(!db.is_closed());
        db.close().unwrap();
        db.close().unwrap();
        assert!(db.is_closed());

        let err = db.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[test]
    fn test_close_waits_for_admitted_operation() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&config_in(&dir)).unwrap();
        let finished = AtomicBool::new(false);
        let (admitted_tx, admitted_rx) = mpsc::channel();

        std::thread::scope(|s| {
            let in_flight = s.spawn(|| {
                db.with_conn(|conn| {
                    admitted_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(200));
                    conn.execute(
                        "INSERT INTO gazette_entries
                            (password_hash, encrypted_dek, salt, created_at, updated_at)
                         VALUES ('h-slow', 'dek', 'salt', 1, 1)",
                        [],
                    )?;
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                })
            });

            admitted_rx.recv().unwrap();
            let closer = s.spawn(|| {
                db.close().unwrap();
                finished.load(Ordering::SeqCst)
            });

            assert!(in_flight.join().unwrap().is_ok());
            assert!(
                closer.join().unwrap(),
                "close returned before the admitted operation completed"
            );
        });

        let err = db.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::Closed));

        let reopened = Database::open(&config_in(&dir)).unwrap();
        let n: i64 = reopened
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT count(*) FROM gazette_entries WHERE password_hash = 'h-slow'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(n, 1, "the admitted write is durable");
    }
}
