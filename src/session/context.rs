use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::broadcast::{Broadcaster, MarkerTransport, PollingTransport};
use super::gate::{RedirectReason, RedirectSignal, RouteGate};
use super::scheduler::{RefreshOutcome, RefreshScheduler};
use super::store::{Initialization, PersistedSession, SessionStore};
use crate::access::{AccessResolver, CapabilityDescriptor, Decision, DenyReason, GrantReason};
use crate::collab::{CollabError, HttpBackend, Issuer, ProfileSource, RoleSource};
use crate::config::{self, AppConfig};
use crate::error::SessionError;
use crate::storage::{FileStorage, SessionStorage};
use crate::types::{CredentialBundle, Credentials, Principal, PrincipalPatch, SessionState};

/// The three trusted services a context talks to
#[derive(Clone)]
pub struct Collaborators {
    pub issuer: Arc<dyn Issuer>,
    pub profiles: Arc<dyn ProfileSource>,
    pub roles: Arc<dyn RoleSource>,
}

impl Collaborators {
    /// Use one backend for all three roles
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: Issuer + ProfileSource + RoleSource + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            issuer: backend.clone(),
            profiles: backend.clone(),
            roles: backend,
        }
    }
}

/// One open client context: the session store plus everything that reacts
/// to it. Contexts sharing a storage profile and transport stay in sync.
pub struct SessionContext {
    store: Arc<SessionStore>,
    scheduler: Arc<RefreshScheduler>,
    access: Arc<AccessResolver>,
    issuer: Arc<dyn Issuer>,
    profiles: Arc<dyn ProfileSource>,
    signal: RedirectSignal,
    entry_path: String,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    pub fn new(
        collaborators: Collaborators,
        storage: Arc<dyn SessionStorage>,
        transport: Arc<dyn MarkerTransport>,
        config: &AppConfig,
    ) -> Self {
        let broadcaster = Arc::new(Broadcaster::new(storage.clone(), transport));
        let store = Arc::new(SessionStore::new(
            storage,
            broadcaster,
            config.storage.legacy_keys.clone(),
        ));
        let signal = RedirectSignal::new();
        let scheduler = Arc::new(RefreshScheduler::new(
            store.clone(),
            collaborators.issuer.clone(),
            signal.clone(),
            config.session.clone(),
        ));

        Self {
            store,
            scheduler,
            access: Arc::new(AccessResolver::new(collaborators.roles)),
            issuer: collaborators.issuer,
            profiles: collaborators.profiles,
            signal,
            entry_path: config.session.entry_path.clone(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// HTTP collaborators, the configured storage profile and a polling
    /// transport over it
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let backend = HttpBackend::new(&config.issuer)?;
        let file = FileStorage::from_config(&config.storage)?;
        info!("Opened session profile {}", file.path().display());
        let storage: Arc<dyn SessionStorage> = Arc::new(file);
        let transport = Arc::new(PollingTransport::new(storage.clone(), config.broadcast.poll_interval()));

        Ok(Self::new(Collaborators::from_backend(backend), storage, transport, config))
    }

    /// `from_config` over the process-wide configuration
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_config(config::config())
    }

    /// Resolve the persisted session at startup.
    ///
    /// Refreshes the access token, then fetches the profile to confirm it. A
    /// rejected refresh token logs out and raises the expiry redirect. On a
    /// transient failure the state stays `Resolving` unless the refresh
    /// already proved the token fresh, in which case the persisted principal
    /// is trusted. A profile rejection only logs out once a refresh succeeded
    /// or no refresh token exists.
    pub async fn bootstrap(&self) -> Result<SessionState, SessionError> {
        self.spawn_background();

        match self.store.initialize() {
            Initialization::Unauthenticated => Ok(self.store.state()),
            Initialization::PendingValidation(persisted) => self.validate(persisted).await,
        }
    }

    async fn validate(&self, persisted: PersistedSession) -> Result<SessionState, SessionError> {
        let refreshed = match self.scheduler.refresh().await? {
            RefreshOutcome::Refreshed => true,
            RefreshOutcome::Deferred(reason) => {
                info!("Startup refresh deferred: {}", reason);
                false
            }
            RefreshOutcome::Skipped | RefreshOutcome::Discarded => false,
        };

        if self.store.generation() != persisted.generation {
            debug!("Session changed during startup validation");
            return Ok(self.store.state());
        }

        let Some(access_token) = self.store.stored_access_token() else {
            return Ok(self.store.state());
        };

        match self.profiles.get_profile(&access_token).await {
            Ok(principal) => {
                self.store.confirm(principal, persisted.generation);
                Ok(self.store.state())
            }
            // Refresh token still untried: keep resolving so the next
            // bootstrap retries it
            Err(CollabError::AuthExpired(reason))
                if !refreshed && persisted.credentials.refresh_token.is_some() =>
            {
                warn!("Profile rejected the stale access token before a refresh succeeded: {}", reason);
                Err(SessionError::TransientNetwork(format!("refresh pending: {}", reason)))
            }
            Err(CollabError::AuthExpired(reason)) => {
                if self.store.generation() == persisted.generation {
                    warn!("Profile fetch rejected persisted credentials: {}", reason);
                    self.store.logout();
                    self.signal.raise(RedirectReason::SessionExpired);
                }
                Err(SessionError::AuthenticationExpired(reason))
            }
            Err(e) => {
                let err = SessionError::from(e);
                match persisted.principal {
                    Some(principal) if refreshed => {
                        warn!("Profile fetch failed after a fresh refresh, using persisted principal: {}", err);
                        self.store.confirm(principal, persisted.generation);
                        Ok(self.store.state())
                    }
                    _ => {
                        warn!("Could not validate persisted session, still resolving: {}", err);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Log in through the issuer. A credential rejection maps to `Rejected`.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Principal, SessionError> {
        self.spawn_background();

        let grant = match self.issuer.login(credentials).await {
            Ok(grant) => grant,
            Err(CollabError::AuthExpired(reason)) => {
                info!("Login for '{}' rejected", credentials.username);
                return Err(SessionError::Rejected(reason));
            }
            Err(e) => return Err(e.into()),
        };

        self.signal.take();
        let principal = grant.principal.clone();
        self.store.login(
            grant.principal,
            CredentialBundle::new(grant.access_token, Some(grant.refresh_token)),
        )?;
        Ok(principal)
    }

    pub fn sign_out(&self) {
        self.store.logout();
    }

    pub fn update_profile(&self, patch: PrincipalPatch) -> Result<Option<Principal>, SessionError> {
        self.store.update_principal(patch)
    }

    /// Refresh on demand, e.g. after a request failed with an expired token
    pub async fn refresh(&self) -> Result<RefreshOutcome, SessionError> {
        self.scheduler.refresh().await
    }

    /// Fetch the role table and the current principal's explicit roles.
    /// Both are attempted; the first failure is returned.
    pub async fn load_access(&self) -> Result<(), SessionError> {
        let table = self.access.refresh_table().await.map(|_| ());
        let roles = match self.store.principal() {
            Some(principal) => self.access.load_principal_roles(&principal.id).await.map(|_| ()),
            None => Ok(()),
        };
        table.and(roles)
    }

    pub fn can(&self, descriptor: &CapabilityDescriptor) -> Decision {
        match self.store.principal() {
            Some(principal) => self.access.check(&principal, descriptor),
            None => Decision::Deny(DenyReason::NoPrincipal),
        }
    }

    pub fn require(&self, descriptor: &CapabilityDescriptor) -> Result<GrantReason, SessionError> {
        self.can(descriptor).into_result(descriptor)
    }

    /// Menu entries the current principal may see
    pub fn visible<'a>(&self, descriptors: &'a [CapabilityDescriptor]) -> Vec<&'a CapabilityDescriptor> {
        match self.store.principal() {
            Some(principal) => self.access.visible(&principal, descriptors),
            None => Vec::new(),
        }
    }

    pub fn gate(&self) -> RouteGate {
        RouteGate::new(self.store.subscribe(), self.entry_path.clone(), self.signal.clone())
    }

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    pub fn access(&self) -> &Arc<AccessResolver> {
        &self.access
    }

    pub fn redirect_signal(&self) -> &RedirectSignal {
        &self.signal
    }

    /// Stop background work. The persisted session is left untouched.
    pub fn teardown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.scheduler.cancel();
    }

    // Broadcast listener plus a supervisor that runs the refresh ticker while
    // authenticated and drops cached roles of principals that left
    fn spawn_background(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.push(self.store.broadcaster().listen(self.store.clone()));

        let mut state = self.store.subscribe();
        let scheduler = self.scheduler.clone();
        let access = self.access.clone();
        tasks.push(tokio::spawn(async move {
            let mut current: Option<String> = None;
            loop {
                let (authenticated, principal_id) = {
                    let state = state.borrow_and_update();
                    (state.is_authenticated(), state.principal().map(|p| p.id.clone()))
                };

                if authenticated {
                    scheduler.start();
                } else {
                    scheduler.cancel();
                }

                if principal_id != current {
                    if let Some(previous) = current.take() {
                        access.forget_principal(&previous);
                    }
                    current = principal_id;
                }

                if state.changed().await.is_err() {
                    break;
                }
            }
        }));
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.teardown();
    }
}
