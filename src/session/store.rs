use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::broadcast::{Broadcaster, SessionEvent};
use crate::auth;
use crate::error::SessionError;
use crate::storage::{
    SessionStorage, StorageError, ACCESS_TOKEN_KEY, PRINCIPAL_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS,
};
use crate::types::{CredentialBundle, Principal, PrincipalPatch, Session, SessionState};

/// What `initialize` found in persisted storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initialization {
    Unauthenticated,
    PendingValidation(PersistedSession),
}

/// Persisted credentials awaiting validation. `principal` is absent when only
/// tokens were stored; the profile fetch supplies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub credentials: CredentialBundle,
    pub principal: Option<Principal>,
    pub generation: u64,
}

/// Refresh token as read at the start of a refresh, bound to the generation
/// it was read under
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub refresh_token: String,
    pub generation: u64,
}

impl std::fmt::Debug for RefreshTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTicket")
            .field("refresh_token", &auth::fingerprint(&self.refresh_token))
            .field("generation", &self.generation)
            .finish()
    }
}

enum Persisted {
    Absent,
    Present {
        credentials: CredentialBundle,
        principal: Option<Principal>,
    },
    Corrupt(String),
}

/// Single source of truth for "who is logged in" in one context.
///
/// Every login, logout and resync bumps the generation. Async work captures
/// the generation when it starts and its result is dropped if the generation
/// has moved by the time it lands.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    broadcaster: Arc<Broadcaster>,
    legacy_keys: Vec<String>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, broadcaster: Arc<Broadcaster>, legacy_keys: Vec<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Resolving);
        Self {
            storage,
            broadcaster,
            legacy_keys,
            state,
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .borrow()
            .credentials()
            .map(|c| c.access_token.clone())
    }

    /// Access token as persisted, readable while the state is still `Resolving`
    pub fn stored_access_token(&self) -> Option<String> {
        self.storage.get_or_absent(ACCESS_TOKEN_KEY)
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Read persisted credentials without touching the network. The state
    /// stays `Resolving` until `confirm` or `logout`.
    pub fn initialize(&self) -> Initialization {
        let _guard = self.write_lock.lock();

        match self.load_persisted() {
            Persisted::Absent => {
                info!("No persisted session found");
                self.state.send_replace(SessionState::Unauthenticated);
                Initialization::Unauthenticated
            }
            Persisted::Corrupt(reason) => {
                warn!("{}; clearing persisted session", SessionError::CorruptPersistedState(reason));
                self.clear_persisted();
                self.bump_generation();
                self.state.send_replace(SessionState::Unauthenticated);
                Initialization::Unauthenticated
            }
            Persisted::Present { credentials, principal } => {
                debug!(
                    "Found persisted session for {:?}, awaiting validation",
                    principal.as_ref().map(|p| p.id.as_str())
                );
                self.state.send_replace(SessionState::Resolving);
                Initialization::PendingValidation(PersistedSession {
                    credentials,
                    principal,
                    generation: self.generation(),
                })
            }
        }
    }

    /// Finish validation with a fetched principal. Refused when a login,
    /// logout or resync happened after `generation` was read, or the access
    /// token was cleared meanwhile.
    pub fn confirm(&self, principal: Principal, generation: u64) -> bool {
        let _guard = self.write_lock.lock();

        if self.generation() != generation {
            debug!("Discarding validation of '{}': session changed meanwhile", principal.id);
            return false;
        }

        let Some(access_token) = self.storage.get_or_absent(ACCESS_TOKEN_KEY) else {
            debug!("Discarding validation of '{}': access token gone", principal.id);
            return false;
        };
        let refresh_token = self.storage.get_or_absent(REFRESH_TOKEN_KEY);

        if let Err(e) = self.write_principal(&principal) {
            warn!("Could not persist validated principal: {}", e);
        }

        info!("Session validated for principal '{}'", principal.id);
        self.state.send_replace(SessionState::Authenticated(Session {
            principal,
            credentials: CredentialBundle::new(access_token, refresh_token),
        }));
        true
    }

    /// Persist a new session, publish it locally, then tell other contexts
    pub fn login(&self, principal: Principal, credentials: CredentialBundle) -> Result<(), SessionError> {
        {
            let _guard = self.write_lock.lock();

            if let Err(e) = self.write_session(&principal, &credentials) {
                self.clear_persisted();
                return Err(e.into());
            }

            self.bump_generation();
            info!(
                "Principal '{}' logged in ({})",
                principal.id,
                auth::fingerprint(&credentials.access_token)
            );
            self.state.send_replace(SessionState::Authenticated(Session { principal, credentials }));
        }

        if let Err(e) = self.broadcaster.emit(SessionEvent::Login) {
            warn!("Login marker could not be written: {}", e);
        }
        Ok(())
    }

    /// Clear every session key (legacy names included). Idempotent: a second
    /// call finds nothing to clear and does not broadcast again.
    pub fn logout(&self) {
        let cleared = {
            let _guard = self.write_lock.lock();

            let had_keys = self.has_persisted_keys();
            self.clear_persisted();
            self.bump_generation();
            let previous = self.state.send_replace(SessionState::Unauthenticated);
            had_keys || previous.is_authenticated()
        };

        if !cleared {
            debug!("Logout with nothing to clear");
            return;
        }

        info!("Session logged out");
        if let Err(e) = self.broadcaster.emit(SessionEvent::Logout) {
            warn!("Logout marker could not be written: {}", e);
        }
    }

    /// Merge a profile edit into the authenticated principal and persist it.
    /// Returns `Ok(None)` when nobody is logged in.
    pub fn update_principal(&self, patch: PrincipalPatch) -> Result<Option<Principal>, SessionError> {
        let _guard = self.write_lock.lock();

        let SessionState::Authenticated(mut session) = self.state() else {
            return Ok(None);
        };

        session.principal.apply(patch);
        self.write_principal(&session.principal)?;

        let principal = session.principal.clone();
        self.state.send_replace(SessionState::Authenticated(session));
        Ok(Some(principal))
    }

    /// Persisted refresh token plus current generation, if a refresh makes sense
    pub fn refresh_ticket(&self) -> Option<RefreshTicket> {
        if matches!(*self.state.borrow(), SessionState::Unauthenticated) {
            return None;
        }

        let refresh_token = self.storage.get_or_absent(REFRESH_TOKEN_KEY)?;
        Some(RefreshTicket {
            refresh_token,
            generation: self.generation(),
        })
    }

    /// Store a refreshed access token. Dropped if the session moved on or the
    /// refresh token was rotated since `ticket` was taken. Not broadcast.
    pub fn apply_access_token(&self, ticket: &RefreshTicket, access_token: String) -> bool {
        let _guard = self.write_lock.lock();

        if self.generation() != ticket.generation {
            debug!("Discarding refreshed token: generation {} is stale", ticket.generation);
            return false;
        }
        if matches!(*self.state.borrow(), SessionState::Unauthenticated) {
            return false;
        }
        if self.storage.get_or_absent(REFRESH_TOKEN_KEY).as_deref() != Some(ticket.refresh_token.as_str()) {
            debug!("Discarding refreshed token: refresh token changed meanwhile");
            return false;
        }

        if let Err(e) = self.storage.set(ACCESS_TOKEN_KEY, &access_token) {
            warn!("Could not persist refreshed access token: {}", e);
            return false;
        }

        debug!("Access token refreshed ({})", auth::fingerprint(&access_token));
        self.state.send_if_modified(|state| match state {
            SessionState::Authenticated(session) => {
                session.credentials = CredentialBundle::new(access_token, session.credentials.refresh_token.take());
                true
            }
            _ => false,
        });
        true
    }

    /// Re-derive state from persisted storage after another context wrote it
    pub fn resync(&self) -> SessionState {
        let _guard = self.write_lock.lock();

        let next = match self.load_persisted() {
            Persisted::Present {
                credentials,
                principal: Some(principal),
            } => SessionState::Authenticated(Session { principal, credentials }),
            Persisted::Present { principal: None, .. } => {
                warn!("Persisted tokens without a principal; treating as logged out");
                SessionState::Unauthenticated
            }
            Persisted::Corrupt(reason) => {
                warn!("{}; treating as logged out", SessionError::CorruptPersistedState(reason));
                SessionState::Unauthenticated
            }
            Persisted::Absent => SessionState::Unauthenticated,
        };

        let changed = !same_session(&self.state.borrow(), &next);
        if changed {
            self.bump_generation();
            info!(
                "Resynchronized session: {}",
                next.principal().map_or("logged out", |p| p.id.as_str())
            );
            self.state.send_replace(next.clone());
        }
        next
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn load_persisted(&self) -> Persisted {
        let Some(access_token) = self.storage.get_or_absent(ACCESS_TOKEN_KEY) else {
            return Persisted::Absent;
        };
        let refresh_token = self.storage.get_or_absent(REFRESH_TOKEN_KEY);

        let principal = match self.storage.get_or_absent(PRINCIPAL_KEY) {
            None => None,
            Some(raw) => match serde_json::from_str::<Principal>(&raw) {
                Ok(principal) => Some(principal),
                Err(e) => return Persisted::Corrupt(format!("stored principal: {}", e)),
            },
        };

        Persisted::Present {
            credentials: CredentialBundle::new(access_token, refresh_token),
            principal,
        }
    }

    fn write_session(&self, principal: &Principal, credentials: &CredentialBundle) -> Result<(), StorageError> {
        self.storage.set(ACCESS_TOKEN_KEY, &credentials.access_token)?;
        match &credentials.refresh_token {
            Some(refresh_token) => self.storage.set(REFRESH_TOKEN_KEY, refresh_token)?,
            None => self.storage.remove(REFRESH_TOKEN_KEY)?,
        }
        self.write_principal(principal)
    }

    fn write_principal(&self, principal: &Principal) -> Result<(), StorageError> {
        let json = serde_json::to_string(principal)?;
        self.storage.set(PRINCIPAL_KEY, &json)
    }

    fn session_keys(&self) -> impl Iterator<Item = &str> {
        SESSION_KEYS
            .into_iter()
            .chain(self.legacy_keys.iter().map(String::as_str))
    }

    fn has_persisted_keys(&self) -> bool {
        self.session_keys()
            .any(|key| matches!(self.storage.get(key), Ok(Some(_))))
    }

    fn clear_persisted(&self) {
        for key in self.session_keys() {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to clear session key '{}': {}", key, e);
            }
        }
    }
}

// issued_at is re-derived on every load, so compare the stored values only
fn same_session(current: &SessionState, next: &SessionState) -> bool {
    match (current, next) {
        (SessionState::Authenticated(a), SessionState::Authenticated(b)) => {
            a.principal == b.principal
                && a.credentials.access_token == b.credentials.access_token
                && a.credentials.refresh_token == b.credentials.refresh_token
        }
        (SessionState::Unauthenticated, SessionState::Unauthenticated) => true,
        _ => false,
    }
}
