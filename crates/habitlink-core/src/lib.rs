//! habitlink-core - client-side session management for the habitlink partner SDK.
//!
//! This crate provides:
//! - `api`: the partner API client and its request/error taxonomy
//! - `auth`: the persisted identity record and the session coordinator
//! - `config`: partner id and environment selection
//! - `platform`: capabilities the host lends to the SDK
//! - `HabitSdk`: the host-facing entry point tying these together

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod platform;
pub mod sdk;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, ApiErrorKind, ApiRequest, PartnerApi};
pub use auth::{
    CredentialStore, FileBackend, IdentifyOutcome, IdentityRecord, KeyringBackend, MemoryBackend,
    Session, SessionStatus, StoreBackend,
};
pub use config::{Environment, SdkConfig};
pub use error::{ErrorCategory, SdkError};
pub use platform::{
    AlwaysSupported, Capabilities, OnboardingCompletion, OnboardingPresenter, OnboardingRequest,
};
pub use sdk::HabitSdk;
