//! Authentication module for managing the user's identity and bearer token.
//!
//! This module provides:
//! - `CredentialStore`: the persisted identity record and its update rules
//! - `StoreBackend`: file, OS keychain and in-memory media for that record
//! - `Session`: identity reconciliation and single-flight token acquisition

pub mod backend;
pub mod pending;
pub mod session;
pub mod store;

pub use backend::{FileBackend, IdentityRecord, KeyringBackend, MemoryBackend, StoreBackend};
pub use pending::PendingAuthentication;
pub use session::{IdentifyOutcome, Session, SessionStatus};
pub use store::CredentialStore;
