use thiserror::Error;

use crate::api::ApiError;

/// Broad class of an [`SdkError`], so hosts can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Identity,
    Transport,
    Unknown,
}

/// Every fallible public SDK operation reports one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("SDK is not configured - call configure() first")]
    SdkIsNotConfigured,

    #[error("Invalid SDK configuration: {0}")]
    InvalidSdkConfiguration(String),

    #[error("This feature is not supported on this device")]
    SdkIsNotSupported,

    #[error("User is not identified - call identify() first")]
    UserIsNotIdentified,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SdkError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SdkError::SdkIsNotConfigured
            | SdkError::InvalidSdkConfiguration(_)
            | SdkError::SdkIsNotSupported => ErrorCategory::Configuration,
            SdkError::UserIsNotIdentified => ErrorCategory::Identity,
            SdkError::Api(_) => ErrorCategory::Transport,
            SdkError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// The remote API error behind this failure, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SdkError::Api(e) => Some(e),
            _ => None,
        }
    }
}
