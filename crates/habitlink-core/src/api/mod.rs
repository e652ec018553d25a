//! REST API client module for the habitlink partner API.
//!
//! This module provides the `ApiClient` for exchanging a partner user id
//! for a bearer token and for reporting daily habit completions, plus the
//! `ApiRequest` descriptor used to route requests and tag their errors.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, PartnerApi};
pub use error::{ApiError, ApiErrorKind};
pub use request::ApiRequest;
