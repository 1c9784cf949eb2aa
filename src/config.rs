// Gazette — Configuration
//
// Store settings come from CLI flags backed by environment variables
// (DB_PATH, DB_KEY, DB_CIPHER, DB_JOURNAL_MODE, DB_BUSY_TIMEOUT_MS).
// A missing encryption key is always fatal: there is no fallback key.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use thiserror::Error;
use zeroize::Zeroizing;

/// Default location of the encrypted store, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/gazette.db";

/// Default time SQLite waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DB_KEY is not set; refusing to open an unencrypted store")]
    MissingEncryptionKey,

    #[error("Invalid duration '{0}' (expected e.g. 500ms, 45s, 15m, 12h, 30d)")]
    InvalidDuration(String),

    #[error("Interval '{0}' must be greater than zero")]
    ZeroInterval(String),
}

// ─── Cipher / Durability ─────────────────────────────────────────────────────

/// SQLCipher cipher profile applied via `PRAGMA cipher_compatibility`.
///
/// `sqlcipher4` is AES-256-CBC with HMAC-SHA512 and PBKDF2-HMAC-SHA512
/// (256k iterations); `sqlcipher3` is the older SHA1 profile, kept only for
/// opening stores created by older builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CipherProfile {
    #[default]
    Sqlcipher4,
    Sqlcipher3,
}

impl CipherProfile {
    /// Value for `PRAGMA cipher_compatibility`.
    pub const fn compatibility(self) -> i64 {
        match self {
            Self::Sqlcipher4 => 4,
            Self::Sqlcipher3 => 3,
        }
    }
}

impl fmt::Display for CipherProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlcipher4 => write!(f, "sqlcipher4"),
            Self::Sqlcipher3 => write!(f, "sqlcipher3"),
        }
    }
}

/// Journaling mode: write-ahead log or classic rollback journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

// ─── Store Config ────────────────────────────────────────────────────────────

/// Everything the escrow store needs to open its encrypted file.
#[derive(Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    encryption_key: Zeroizing<String>,
    pub cipher: CipherProfile,
    pub journal_mode: JournalMode,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Build a config with the default cipher, WAL journaling and busy timeout.
    /// Fails if the key is empty or whitespace.
    pub fn new(path: impl Into<PathBuf>, encryption_key: &str) -> Result<Self, ConfigError> {
        if encryption_key.trim().is_empty() {
            return Err(ConfigError::MissingEncryptionKey);
        }
        Ok(Self {
            path: path.into(),
            encryption_key: Zeroizing::new(encryption_key.to_string()),
            cipher: CipherProfile::default(),
            journal_mode: JournalMode::default(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        })
    }

    pub fn with_cipher(mut self, cipher: CipherProfile) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// The SQLCipher passphrase. Only the store should read this.
    pub(crate) fn encryption_key(&self) -> &str {
        &self.encryption_key
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field("encryption_key", &"[REDACTED]")
            .field("cipher", &self.cipher)
            .field("journal_mode", &self.journal_mode)
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

// ─── CLI / Env Arguments ─────────────────────────────────────────────────────

/// Store flags shared by every subcommand.
#[derive(Args, Clone)]
pub struct StoreArgs {
    /// Location of the encrypted store file.
    #[arg(long = "db-path", env = "DB_PATH", default_value = DEFAULT_DB_PATH, global = true)]
    pub db_path: PathBuf,

    /// SQLCipher passphrase. Required; prefer the DB_KEY environment variable.
    #[arg(long = "db-key", env = "DB_KEY", hide_env_values = true, global = true)]
    pub db_key: Option<String>,

    /// Cipher profile.
    #[arg(long = "db-cipher", env = "DB_CIPHER", value_enum, default_value_t = CipherProfile::Sqlcipher4, global = true)]
    pub cipher: CipherProfile,

    /// Journaling mode: `wal` (write-ahead) or `delete` (rollback journal).
    #[arg(long = "db-journal-mode", env = "DB_JOURNAL_MODE", value_enum, default_value_t = JournalMode::Wal, global = true)]
    pub journal_mode: JournalMode,

    /// Milliseconds to wait on a locked database.
    #[arg(long = "db-busy-timeout-ms", env = "DB_BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS, global = true)]
    pub busy_timeout_ms: u64,
}

impl StoreArgs {
    /// Validate the arguments into a [`StoreConfig`].
    pub fn to_config(&self) -> Result<StoreConfig, ConfigError> {
        let key = self
            .db_key
            .as_deref()
            .ok_or(ConfigError::MissingEncryptionKey)?;

        Ok(StoreConfig::new(self.db_path.clone(), key)?
            .with_cipher(self.cipher)
            .with_journal_mode(self.journal_mode)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms)))
    }
}

impl fmt::Debug for StoreArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreArgs")
            .field("db_path", &self.db_path)
            .field("db_key", &self.db_key.as_ref().map(|_| "[REDACTED]"))
            .field("cipher", &self.cipher)
            .field("journal_mode", &self.journal_mode)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

// ─── Durations ───────────────────────────────────────────────────────────────

/// Parse a human duration such as `500ms`, `45s`, `15m`, `12h` or `30d`.
/// A bare number is taken as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);

    let amount: u64 = num
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;

    let secs = |mult: u64| {
        amount
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::InvalidDuration(raw.to_string()))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        "d" => secs(24 * 60 * 60),
        _ => Err(ConfigError::InvalidDuration(raw.to_string())),
    }
}

/// clap `value_parser` adapter for [`parse_duration`].
pub fn duration_arg(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

/// Like [`parse_duration`], but a period of zero is an error.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let every = parse_duration(raw)?;
    if every.is_zero() {
        return Err(ConfigError::ZeroInterval(raw.to_string()));
    }
    Ok(every)
}

/// clap `value_parser` adapter for [`parse_interval`].
pub fn interval_arg(raw: &str) -> Result<Duration, String> {
    parse_interval(raw).map_err(|e| e.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(key: Option<&str>) -> StoreArgs {
        StoreArgs {
            db_path: PathBuf::from("/tmp/gazette-test.db"),
            db_key: key.map(str::to_string),
            cipher: CipherProfile::Sqlcipher4,
            journal_mode: JournalMode::Delete,
            busy_timeout_ms: 250,
        }
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let err = args(None).to_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEncryptionKey));
    }

    #[test]
    fn test_blank_key_is_fatal() {
        let err = args(Some("   ")).to_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEncryptionKey));
    }

    #[test]
    fn test_args_carry_into_config() {
        let config = args(Some("correct horse battery staple")).to_config().unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/gazette-test.db"));
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.cipher, CipherProfile::Sqlcipher4);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.encryption_key(), "correct horse battery staple");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = StoreConfig::new("/tmp/x.db", "hunter2-passphrase").unwrap();
        let out = format!("{:?}", config);
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("hunter2-passphrase"));

        let out = format!("{:?}", args(Some("hunter2-passphrase")));
        assert!(!out.contains("hunter2-passphrase"));
    }

    #[test]
    fn test_pragma_values() {
        assert_eq!(JournalMode::Wal.pragma_value(), "wal");
        assert_eq!(JournalMode::Delete.pragma_value(), "delete");
        assert_eq!(CipherProfile::Sqlcipher4.compatibility(), 4);
        assert_eq!(CipherProfile::Sqlcipher3.compatibility(), 3);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_duration("30d").unwrap(), Duration::from_secs(2_592_000));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("10w").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("99999999999999999999d").is_err());
    }

    #[test]
    fn test_parse_interval_rejects_zero() {
        assert_eq!(parse_interval("10ms").unwrap(), Duration::from_millis(10));
        assert!(matches!(parse_interval("0s"), Err(ConfigError::ZeroInterval(_))));
        assert!(matches!(parse_interval("0"), Err(ConfigError::ZeroInterval(_))));
        assert!(matches!(parse_interval("0ms"), Err(ConfigError::ZeroInterval(_))));
    }
}
