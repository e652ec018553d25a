//! Capabilities the host platform lends to the SDK.
//!
//! The SDK never renders anything. It asks the host whether the feature is
//! available on this device, and hands a ready token to the host's
//! onboarding UI, which reports back once the user is done.

use crate::config::Environment;
use crate::error::SdkError;

pub trait Capabilities: Send + Sync {
    fn is_supported(&self) -> bool;
}

/// For hosts where the feature is always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSupported;

impl Capabilities for AlwaysSupported {
    fn is_supported(&self) -> bool {
        true
    }
}

impl<F> Capabilities for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_supported(&self) -> bool {
        self()
    }
}

/// What the onboarding UI needs to link the user's account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingRequest {
    pub user_id: String,
    pub partner_token: String,
    pub environment: Environment,
}

/// Called exactly once by the presenter when onboarding ends.
pub type OnboardingCompletion = Box<dyn FnOnce(Result<(), SdkError>) + Send>;

pub trait OnboardingPresenter: Send + Sync {
    fn present(&self, request: OnboardingRequest, completion: OnboardingCompletion);
}
