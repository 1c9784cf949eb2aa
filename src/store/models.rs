// Gazette — Escrow entry models
//
// SECURITY: `encrypted_dek` and `salt` are private and wrapped in
// `Zeroizing`. They never show up in Debug or Display output, and
// `EntrySummary` has no field for them at all.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// One escrowed record, decoded from a `gazette_entries` row.
pub struct EscrowEntry {
    pub password_hash: String,
    encrypted_dek: Zeroizing<String>,
    salt: Zeroizing<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; never earlier than `created_at`.
    pub updated_at: i64,
    /// Starts at 1 and grows by one per update.
    pub version: i64,
    pub metadata: Option<serde_json::Value>,
}

impl EscrowEntry {
    pub fn new(
        password_hash: String,
        encrypted_dek: String,
        salt: String,
        created_at: i64,
        updated_at: i64,
        version: i64,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            password_hash,
            encrypted_dek: Zeroizing::new(encrypted_dek),
            salt: Zeroizing::new(salt),
            created_at,
            updated_at,
            version,
            metadata,
        }
    }

    /// The escrowed ciphertext. Must not be logged.
    pub fn encrypted_dek(&self) -> &str {
        &self.encrypted_dek
    }

    /// The derivation salt. Must not be logged.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.created_at)
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.updated_at)
    }
}

impl fmt::Debug for EscrowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowEntry")
            .field("password_hash", &self.password_hash)
            .field("encrypted_dek", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("version", &self.version)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for EscrowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] v{}", self.password_hash, self.version)
    }
}

/// Listing view of an entry. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl fmt::Display for EntrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = |ms: i64| {
            DateTime::<Utc>::from_timestamp_millis(ms)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| ms.to_string())
        };
        write!(
            f,
            "{} │ v{:<4} │ created {} │ updated {}",
            self.password_hash,
            self.version,
            stamp(self.created_at),
            stamp(self.updated_at),
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> EscrowEntry {
        EscrowEntry::new(
            "a1b2c3".to_string(),
            "enc-dek-ciphertext-XYZ".to_string(),
            "salt-0f0f0f".to_string(),
            1_700_000_000_000,
            1_700_000_000_500,
            2,
            Some(serde_json::json!({"device": "laptop"})),
        )
    }

    #[test]
    fn test_entry_debug_redacts_key_material() {
        let out = format!("{:?}", entry());
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("enc-dek-ciphertext-XYZ"));
        assert!(!out.contains("salt-0f0f0f"));
        assert!(out.contains("a1b2c3"), "password hash is safe to show");
    }

    #[test]
    fn test_entry_display_has_no_key_material() {
        let out = format!("{}", entry());
        assert_eq!(out, "[a1b2c3] v2");
    }

    #[test]
    fn test_accessors_return_raw_values() {
        let e = entry();
        assert_eq!(e.encrypted_dek(), "enc-dek-ciphertext-XYZ");
        assert_eq!(e.salt(), "salt-0f0f0f");
        assert_eq!(
            e.created_at_utc().unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert_eq!(
            e.updated_at_utc().unwrap().timestamp_millis(),
            1_700_000_000_500
        );
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = EntrySummary {
            password_hash: "h1".to_string(),
            created_at: 1,
            updated_at: 2,
            version: 1,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["passwordHash"], "h1");
        assert_eq!(json["createdAt"], 1);
        assert_eq!(json["updatedAt"], 2);
        assert_eq!(json["version"], 1);
        assert!(json.get("encryptedDEK").is_none());
    }
}
