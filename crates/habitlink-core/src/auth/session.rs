use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::PartnerApi;
use crate::error::SdkError;
use crate::platform::Capabilities;

use super::pending::PendingAuthentication;
use super::store::CredentialStore;

/// How `identify` classified the user it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyOutcome {
    /// The feature is not available on this device; nothing was stored.
    Unsupported,
    /// Same user as before; the cached token (if any) is kept.
    Known,
    /// First user on this install.
    New,
    /// A different user than the stored one, without a logout in between.
    Mismatched,
}

/// Point-in-time view of the session for hosts and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub user_id: Option<String>,
    pub has_token: bool,
    pub authenticating: bool,
    pub persistence_degraded: bool,
}

#[derive(Default)]
struct PendingSlot {
    current: Option<PendingAuthentication>,
    next_generation: u64,
}

enum Acquired {
    Cached(String),
    Pending(PendingAuthentication),
}

/// Reconciles the host's user with the stored identity and hands out
/// bearer tokens, fetching at most one at a time.
///
/// The pending slot lock is the single point where "is a fetch running?",
/// "is a token cached?" and "start a fetch" are decided, so concurrent
/// callers can never both start an exchange. It is never held across an
/// `.await`; the network call runs in its own task.
///
/// Fetches run on the runtime handed to `new`, so `identify` can be called
/// from any thread, with or without a runtime of its own.
///
/// Store writes are synchronous and happen under the slot lock. With the
/// keychain backend a write may block on the OS (an unlock prompt, say).
pub struct Session {
    store: Arc<CredentialStore>,
    api: Arc<dyn PartnerApi>,
    capabilities: Arc<dyn Capabilities>,
    runtime: Handle,
    pending: Mutex<PendingSlot>,
}

impl Session {
    pub fn new(
        store: Arc<CredentialStore>,
        api: Arc<dyn PartnerApi>,
        capabilities: Arc<dyn Capabilities>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            api,
            capabilities,
            runtime,
            pending: Mutex::new(PendingSlot::default()),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Tell the session who the host's current user is.
    ///
    /// For a new or different user this stores the id, drops the previous
    /// user's token and starts fetching a token in the background. It
    /// returns without waiting for that fetch.
    pub fn identify(&self, user_id: &str) -> IdentifyOutcome {
        if !self.capabilities.is_supported() {
            debug!("identify skipped, feature unsupported");
            return IdentifyOutcome::Unsupported;
        }

        let mut slot = self.pending.lock();
        let previous = self.store.user_id();
        if previous.as_deref() == Some(user_id) {
            debug!(user_id = %user_id, "User already identified");
            return IdentifyOutcome::Known;
        }

        self.store.store_user_id(user_id);
        if let Some(superseded) = slot.current.take() {
            debug!(user_id = %superseded.user_id(), "Superseding in-flight authentication");
        }
        self.start_fetch(&mut slot, user_id);

        match previous {
            None => {
                info!(user_id = %user_id, "New user identified");
                IdentifyOutcome::New
            }
            Some(previous) => {
                warn!(previous = %previous, user_id = %user_id, "User changed without logout");
                IdentifyOutcome::Mismatched
            }
        }
    }

    /// Forget the current user and their token.
    ///
    /// A fetch still running for that user finishes, but its token is not
    /// stored because the user it was tagged with is gone.
    pub fn logout(&self) {
        let mut slot = self.pending.lock();
        self.store.clear_credentials();
        if slot.current.take().is_some() {
            debug!("Dropped in-flight authentication on logout");
        }
        info!("Logged out");
    }

    /// Return a bearer token for the current user, fetching one if needed.
    ///
    /// Concurrent callers share a single in-flight exchange. A cached token
    /// is returned without touching the network. `user_id`, when it differs
    /// from the stored user, switches users first (like `identify`).
    pub async fn ensure_partner_token(&self, user_id: Option<&str>) -> Result<String, SdkError> {
        match self.acquire(user_id)? {
            Acquired::Cached(token) => Ok(token),
            Acquired::Pending(pending) => {
                let generation = pending.generation();
                let result = pending.wait().await;
                self.settle(generation);
                result
            }
        }
    }

    /// Report today's habit as completed for the current user.
    pub async fn complete_daily_habit(&self) -> Result<(), SdkError> {
        let token = self.ensure_partner_token(None).await?;
        self.api.complete_daily_habit(&token).await?;
        info!("Daily habit completed");
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let authenticating = self
            .pending
            .lock()
            .current
            .as_ref()
            .is_some_and(|p| !p.is_settled());
        let record = self.store.snapshot();
        SessionStatus {
            user_id: record.user_id,
            has_token: record.partner_token.is_some_and(|t| !t.is_empty()),
            authenticating,
            persistence_degraded: self.store.persistence_degraded(),
        }
    }

    fn acquire(&self, user_id: Option<&str>) -> Result<Acquired, SdkError> {
        let mut slot = self.pending.lock();

        // a finished exchange is never handed to a new caller: its token is
        // already in the store, and a failure must not be replayed
        if slot.current.as_ref().is_some_and(|p| p.is_settled()) {
            if slot.current.as_ref().is_some_and(|p| p.has_failed()) {
                debug!("Discarding failed authentication");
            }
            slot.current = None;
        }

        let stored = self.store.user_id();
        let switching = matches!(user_id, Some(id) if stored.as_deref() != Some(id));

        if !switching {
            if let Some(pending) = &slot.current {
                debug!("Joining in-flight authentication");
                return Ok(Acquired::Pending(pending.clone()));
            }
            if let Some(token) = self.store.partner_token() {
                return Ok(Acquired::Cached(token));
            }
        }

        let effective = match user_id.map(str::to_string).or(stored) {
            Some(id) => id,
            None => return Err(SdkError::UserIsNotIdentified),
        };
        if switching {
            self.store.store_user_id(&effective);
            slot.current = None;
        }

        Ok(Acquired::Pending(self.start_fetch(&mut slot, &effective)))
    }

    fn start_fetch(&self, slot: &mut PendingSlot, user_id: &str) -> PendingAuthentication {
        let generation = slot.next_generation;
        slot.next_generation += 1;

        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let tag = user_id.to_string();
        let pending = PendingAuthentication::spawn(&self.runtime, generation, user_id, async move {
            let token = api.authenticate_user(&tag).await.map_err(|e| {
                warn!(user_id = %tag, error = %e, "Authentication failed");
                SdkError::from(e)
            })?;
            if store.store_partner_token_for(&tag, &token) {
                info!(user_id = %tag, "Partner token stored");
            } else {
                info!(user_id = %tag, "User changed during authentication, token discarded");
            }
            Ok(token)
        });

        debug!(user_id = %user_id, generation, "Authentication started");
        slot.current = Some(pending.clone());
        pending
    }

    fn settle(&self, generation: u64) {
        let mut slot = self.pending.lock();
        if slot.current.as_ref().map(|p| p.generation()) == Some(generation) {
            slot.current = None;
        }
    }
}
