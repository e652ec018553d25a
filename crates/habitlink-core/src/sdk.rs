//! The host-facing entry point.
//!
//! `HabitSdk` is an ordinary value: hosts construct one with the store
//! backend and platform capabilities they want, configure it, and then
//! call it from any thread. Nothing here is global, so tests can build as
//! many instances as they like.
//!
//! Token fetches run on a Tokio runtime: the one passed to `with_runtime`,
//! or else the one `configure` is called from.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::api::{ApiClient, PartnerApi};
use crate::auth::{CredentialStore, IdentifyOutcome, Session, SessionStatus, StoreBackend};
use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::platform::{Capabilities, OnboardingPresenter, OnboardingRequest};

struct Configured {
    config: SdkConfig,
    session: Arc<Session>,
}

pub struct HabitSdk {
    store: Arc<CredentialStore>,
    capabilities: Arc<dyn Capabilities>,
    runtime: Option<Handle>,
    configured: RwLock<Option<Configured>>,
}

impl HabitSdk {
    pub fn new(backend: Box<dyn StoreBackend>, capabilities: Arc<dyn Capabilities>) -> Self {
        Self {
            store: Arc::new(CredentialStore::open(backend)),
            capabilities,
            runtime: None,
            configured: RwLock::new(None),
        }
    }

    /// Run background work on `runtime`, for hosts that configure the SDK
    /// from a thread outside any Tokio runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate `config` and connect to the environment it names.
    ///
    /// Calling this again replaces the session; the stored identity is kept.
    pub fn configure(&self, config: SdkConfig) -> Result<(), SdkError> {
        config.validate()?;
        let api = ApiClient::new(&config)
            .map_err(|e| SdkError::InvalidSdkConfiguration(format!("{:#}", e)))?;
        self.configure_with_api(config, Arc::new(api))
    }

    /// Like `configure`, with a caller-supplied partner API.
    pub fn configure_with_api(
        &self,
        config: SdkConfig,
        api: Arc<dyn PartnerApi>,
    ) -> Result<(), SdkError> {
        config.validate()?;
        let runtime = self.runtime()?;
        let session = Session::new(
            Arc::clone(&self.store),
            api,
            Arc::clone(&self.capabilities),
            runtime,
        );
        info!(partner_id = %config.partner_id, environment = %config.environment, "SDK configured");
        *self.configured.write() = Some(Configured {
            config,
            session: Arc::new(session),
        });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured.read().is_some()
    }

    pub fn is_supported(&self) -> bool {
        self.capabilities.is_supported()
    }

    pub fn config(&self) -> Option<SdkConfig> {
        self.configured.read().as_ref().map(|c| c.config.clone())
    }

    fn runtime(&self) -> Result<Handle, SdkError> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Handle::try_current().map_err(|_| {
                SdkError::InvalidSdkConfiguration(
                    "no Tokio runtime: configure from within one or use with_runtime".to_string(),
                )
            }),
        }
    }

    fn session(&self) -> Result<Arc<Session>, SdkError> {
        self.configured
            .read()
            .as_ref()
            .map(|c| Arc::clone(&c.session))
            .ok_or(SdkError::SdkIsNotConfigured)
    }

    pub fn identify(&self, user_id: &str) -> Result<IdentifyOutcome, SdkError> {
        Ok(self.session()?.identify(user_id))
    }

    /// Forget the current user. Works before `configure` too, since it only
    /// touches the local store.
    pub fn logout(&self) {
        match self.session() {
            Ok(session) => session.logout(),
            Err(_) => self.store.clear_credentials(),
        }
    }

    pub async fn partner_token(&self, user_id: Option<&str>) -> Result<String, SdkError> {
        self.session()?.ensure_partner_token(user_id).await
    }

    pub async fn complete_daily_habit(&self) -> Result<(), SdkError> {
        self.session()?.complete_daily_habit().await
    }

    pub fn status(&self) -> Result<SessionStatus, SdkError> {
        Ok(self.session()?.status())
    }

    /// Obtain a token for the current user, then hand off to the host's
    /// onboarding UI and wait for it to report back.
    pub async fn present_onboarding(
        &self,
        presenter: &dyn OnboardingPresenter,
    ) -> Result<(), SdkError> {
        let session = self.session()?;
        if !self.is_supported() {
            return Err(SdkError::SdkIsNotSupported);
        }
        let environment = self
            .config()
            .map(|c| c.environment)
            .ok_or(SdkError::SdkIsNotConfigured)?;

        let partner_token = session.ensure_partner_token(None).await?;
        let user_id = self
            .store
            .user_id()
            .ok_or(SdkError::UserIsNotIdentified)?;

        let (tx, rx) = oneshot::channel();
        debug!(user_id = %user_id, "Presenting onboarding");
        presenter.present(
            OnboardingRequest {
                user_id,
                partner_token,
                environment,
            },
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(SdkError::Unknown(
                "onboarding ended without reporting a result".to_string(),
            )),
        }
    }
}
