use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::backend::{IdentityRecord, StoreBackend};

/// The persisted identity record and the rules for changing it.
///
/// The record is loaded once and mirrored in memory. Every mutation is a
/// read-modify-write of the whole record under one lock, followed by a
/// whole-record save to the backend while that lock is still held, so the
/// order of durable writes always matches the order of in-memory updates.
///
/// Persistence problems never fail an operation. A malformed record is
/// replaced by an empty one and a failed save leaves the new value in
/// memory only; both are logged and flip [`CredentialStore::persistence_degraded`].
pub struct CredentialStore {
    backend: Box<dyn StoreBackend>,
    record: Mutex<IdentityRecord>,
    degraded: AtomicBool,
}

impl CredentialStore {
    pub fn open(backend: Box<dyn StoreBackend>) -> Self {
        let mut degraded = false;
        let record = match backend.load() {
            Ok(Some(record)) => {
                debug!(has_user = record.user_id.is_some(), "Identity record loaded");
                record
            }
            Ok(None) => IdentityRecord::default(),
            Err(e) => {
                warn!(error = %e, "Identity record unreadable, starting empty");
                degraded = true;
                IdentityRecord::default()
            }
        };

        Self {
            backend,
            record: Mutex::new(record),
            degraded: AtomicBool::new(degraded),
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.record.lock().user_id.clone()
    }

    /// Stored token, if there is a non-empty one.
    pub fn partner_token(&self) -> Option<String> {
        self.record
            .lock()
            .partner_token
            .clone()
            .filter(|t| !t.is_empty())
    }

    pub fn snapshot(&self) -> IdentityRecord {
        self.record.lock().clone()
    }

    /// Switch to `user_id`, dropping the token if the user changed.
    /// Returns the previously stored user id.
    pub fn store_user_id(&self, user_id: &str) -> Option<String> {
        let mut previous = None;
        self.update(|record| {
            previous = record.user_id.clone();
            if record.user_id.as_deref() == Some(user_id) {
                return false;
            }
            record.user_id = Some(user_id.to_string());
            record.partner_token = None;
            true
        });
        previous
    }

    pub fn store_partner_token(&self, token: &str) {
        self.update(|record| {
            record.partner_token = Some(token.to_string());
            true
        });
    }

    /// Store `token` only if `user_id` is still the current user.
    pub fn store_partner_token_for(&self, user_id: &str, token: &str) -> bool {
        let mut stored = false;
        self.update(|record| {
            if record.user_id.as_deref() != Some(user_id) {
                return false;
            }
            record.partner_token = Some(token.to_string());
            stored = true;
            true
        });
        stored
    }

    pub fn clear_credentials(&self) {
        self.update(|record| {
            if record.is_empty() {
                return false;
            }
            *record = IdentityRecord::default();
            true
        });
    }

    /// Whether the durable copy may be missing or behind the in-memory one.
    pub fn persistence_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn update(&self, mutate: impl FnOnce(&mut IdentityRecord) -> bool) {
        let mut guard = self.record.lock();
        let mut next = guard.clone();
        if !mutate(&mut next) {
            return;
        }

        match self.backend.save(&next) {
            Ok(()) => self.degraded.store(false, Ordering::SeqCst),
            Err(e) => {
                warn!(error = %e, "Failed to persist identity record, keeping it in memory");
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
        *guard = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::backend::{FileBackend, MemoryBackend};

    fn memory_store() -> (CredentialStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::open(Box::new(Arc::clone(&backend)));
        (store, backend)
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let (store, backend) = memory_store();
        assert_eq!(store.user_id(), None);
        assert_eq!(store.partner_token(), None);
        assert!(!store.persistence_degraded());
        assert_eq!(backend.payload(), None);
    }

    #[test]
    fn test_same_user_id_keeps_token() {
        let (store, _) = memory_store();
        store.store_user_id("u1");
        store.store_partner_token("tok-u1");

        assert_eq!(store.store_user_id("u1"), Some("u1".to_string()));
        assert_eq!(store.partner_token().as_deref(), Some("tok-u1"));
    }

    #[test]
    fn test_different_user_id_clears_token() {
        let (store, backend) = memory_store();
        store.store_user_id("u1");
        store.store_partner_token("tok-u1");

        assert_eq!(store.store_user_id("u2"), Some("u1".to_string()));
        assert_eq!(store.user_id().as_deref(), Some("u2"));
        assert_eq!(store.partner_token(), None);

        // the durable copy moved in the same write
        let persisted = backend.load().unwrap().unwrap();
        assert_eq!(persisted.user_id.as_deref(), Some("u2"));
        assert_eq!(persisted.partner_token, None);
    }

    #[test]
    fn test_empty_token_reads_as_missing() {
        let (store, _) = memory_store();
        store.store_user_id("u1");
        store.store_partner_token("");
        assert_eq!(store.partner_token(), None);
    }

    #[test]
    fn test_store_partner_token_for_checks_current_user() {
        let (store, _) = memory_store();
        store.store_user_id("u2");

        assert!(!store.store_partner_token_for("u1", "tok-u1"));
        assert_eq!(store.partner_token(), None);

        assert!(store.store_partner_token_for("u2", "tok-u2"));
        assert_eq!(store.partner_token().as_deref(), Some("tok-u2"));
    }

    #[test]
    fn test_clear_credentials() {
        let (store, backend) = memory_store();
        store.store_user_id("u1");
        store.store_partner_token("tok-u1");

        store.clear_credentials();

        assert!(store.snapshot().is_empty());
        assert!(backend.load().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_record_degrades_to_empty() {
        let store = CredentialStore::open(Box::new(MemoryBackend::with_payload("{\"userId\": 7")));

        assert!(store.snapshot().is_empty());
        assert!(store.persistence_degraded());

        // a successful write recovers
        store.store_user_id("u1");
        assert!(!store.persistence_degraded());
    }

    #[test]
    fn test_write_failure_keeps_value_in_memory() {
        let (store, backend) = memory_store();
        store.store_user_id("u1");
        backend.set_fail_writes(true);

        store.store_partner_token("tok-u1");

        assert_eq!(store.partner_token().as_deref(), Some("tok-u1"));
        assert!(store.persistence_degraded());
        assert_eq!(backend.load().unwrap().unwrap().partner_token, None);
    }

    #[test]
    fn test_record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = CredentialStore::open(Box::new(FileBackend::new(dir.path())));
        store.store_user_id("u1");
        store.store_partner_token("tok-u1");
        let written = store.snapshot();
        drop(store);

        let reopened = CredentialStore::open(Box::new(FileBackend::new(dir.path())));
        assert_eq!(reopened.snapshot(), written);
    }

    #[test]
    fn test_concurrent_user_switches_never_pair_token_with_wrong_user() {
        let (store, _) = memory_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let user = format!("u{}", i % 2);
                    for _ in 0..200 {
                        store.store_user_id(&user);
                        store.store_partner_token_for(&user, &format!("tok-{}", user));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = store.snapshot();
        if let (Some(user), Some(token)) = (record.user_id, record.partner_token) {
            assert_eq!(token, format!("tok-{}", user));
        }
    }
}
