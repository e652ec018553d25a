//! Durable media for the identity record.
//!
//! Every backend reads and writes the whole record at once; none of them
//! ever persists a single field on its own.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Record file name in the data directory
const RECORD_FILE: &str = "identity.json";

/// Keychain service name
const SERVICE_NAME: &str = "habitlink";

/// Keychain account holding the serialized record
const RECORD_ACCOUNT: &str = "identity";

/// Who the current user is, and the token obtained for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "partnerToken", default, skip_serializing_if = "Option::is_none")]
    pub partner_token: Option<String>,
}

impl IdentityRecord {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.partner_token.is_none()
    }
}

pub trait StoreBackend: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<IdentityRecord>>;

    fn save(&self, record: &IdentityRecord) -> Result<()>;
}

impl<T: StoreBackend + ?Sized> StoreBackend for Arc<T> {
    fn load(&self) -> Result<Option<IdentityRecord>> {
        (**self).load()
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        (**self).save(record)
    }
}

// ============================================================================
// File
// ============================================================================

/// JSON file in the app's data directory, replaced atomically on save.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", RECORD_FILE))
    }
}

impl StoreBackend for FileBackend {
    fn load(&self) -> Result<Option<IdentityRecord>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read identity file")?;
        let record = serde_json::from_str(&contents).context("Failed to parse identity file")?;
        Ok(Some(record))
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory {}", self.dir.display()))?;
        let contents = serde_json::to_string_pretty(record)?;
        let temp = self.temp_path();
        std::fs::write(&temp, contents).context("Failed to write identity file")?;
        // rename is atomic on the same filesystem, readers never see half a record
        std::fs::rename(&temp, self.path()).context("Failed to replace identity file")?;
        Ok(())
    }
}

// ============================================================================
// Keychain
// ============================================================================

/// The whole record as a single secret in the OS keychain.
///
/// Reads and writes are blocking calls into the platform keychain and can
/// stall until the user answers an unlock prompt.
pub struct KeyringBackend {
    entry: Entry,
}

impl KeyringBackend {
    pub fn new() -> Result<Self> {
        Self::for_account(RECORD_ACCOUNT)
    }

    /// Separate keychain slot, e.g. one per host app flavour.
    pub fn for_account(account: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl StoreBackend for KeyringBackend {
    fn load(&self) -> Result<Option<IdentityRecord>> {
        match self.entry.get_password() {
            Ok(secret) => {
                let record =
                    serde_json::from_str(&secret).context("Failed to parse identity secret")?;
                Ok(Some(record))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read identity from keychain"),
        }
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        let secret = serde_json::to_string(record)?;
        self.entry
            .set_password(&secret)
            .context("Failed to store identity in keychain")
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local backend for tests and hosts that opt out of persistence.
#[derive(Default)]
pub struct MemoryBackend {
    payload: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an arbitrary serialized payload, valid or not.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn payload(&self) -> Option<String> {
        self.payload.lock().clone()
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Option<IdentityRecord>> {
        match self.payload.lock().as_deref() {
            Some(payload) => {
                let record =
                    serde_json::from_str(payload).context("Failed to parse identity payload")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("memory backend is read-only");
        }
        *self.payload.lock() = Some(serde_json::to_string(record)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IdentityRecord {
        IdentityRecord {
            user_id: Some("u1".to_string()),
            partner_token: Some("tok-u1".to_string()),
        }
    }

    #[test]
    fn test_record_json_layout() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"userId": "u1", "partnerToken": "tok-u1"})
        );

        let empty: IdentityRecord = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("data"));

        assert_eq!(backend.load().unwrap(), None);

        backend.save(&sample()).unwrap();
        assert_eq!(backend.load().unwrap(), Some(sample()));
        assert!(!dir.path().join("data").join("identity.json.tmp").exists());

        let user_only = IdentityRecord {
            user_id: Some("u2".to_string()),
            partner_token: None,
        };
        backend.save(&user_only).unwrap();
        assert_eq!(backend.load().unwrap(), Some(user_only));
    }

    #[test]
    fn test_file_backend_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        std::fs::write(backend.path(), "{not json").unwrap();

        assert!(backend.load().is_err());
    }

    #[test]
    fn test_memory_backend_roundtrip_and_failures() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.load().unwrap(), None);

        backend.save(&sample()).unwrap();
        assert_eq!(backend.load().unwrap(), Some(sample()));

        backend.set_fail_writes(true);
        assert!(backend.save(&IdentityRecord::default()).is_err());
        assert_eq!(backend.load().unwrap(), Some(sample()));

        assert!(MemoryBackend::with_payload("garbage").load().is_err());
    }

    #[test]
    fn test_keyring_backend_roundtrip_with_mock_store() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let backend = KeyringBackend::for_account("test-roundtrip").unwrap();

        assert_eq!(backend.load().unwrap(), None);
        backend.save(&sample()).unwrap();
        assert_eq!(backend.load().unwrap(), Some(sample()));
    }
}
