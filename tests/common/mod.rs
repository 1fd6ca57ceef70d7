#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};

use fincheck_session::collab::{
    CollabError, Issuer, LoginGrant, PrincipalRoles, ProfileSource, RoleAssignmentRecord, RoleSource,
};
use fincheck_session::config::AppConfig;
use fincheck_session::session::{ChannelTransport, Collaborators, MarkerTransport};
use fincheck_session::storage::{MemoryStorage, SessionStorage};
use fincheck_session::{Credentials, Principal, SessionContext, SessionState};

pub fn clerk() -> Principal {
    Principal::new("E100", "Ana", "QA Clerk")
}

pub fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.session.refresh_interval_secs = 60;
    config.session.refresh_retry_secs = 5;
    config.session.expiry_leeway_secs = 10;
    config.session.entry_path = "/".to_string();
    config.storage.legacy_keys = vec!["token".to_string(), "userInfo".to_string(), "userId".to_string()];
    config.broadcast.poll_interval_ms = 20;
    config
}

pub fn record(role: &str, job_titles: &[&str], principals: &[&str]) -> RoleAssignmentRecord {
    RoleAssignmentRecord {
        role: role.to_string(),
        job_titles: job_titles.iter().map(|s| s.to_string()).collect(),
        principals: principals.iter().map(|s| s.to_string()).collect(),
    }
}

/// Scriptable issuer, profile and role-table services
pub struct MockBackend {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub role_table_calls: AtomicUsize,
    login: Mutex<Result<LoginGrant, CollabError>>,
    refresh: Mutex<Result<String, CollabError>>,
    profile: Mutex<Result<Principal, CollabError>>,
    role_table: Mutex<Result<Vec<RoleAssignmentRecord>, CollabError>>,
    principal_roles: Mutex<HashMap<String, Vec<String>>>,
    refresh_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            role_table_calls: AtomicUsize::new(0),
            login: Mutex::new(Ok(LoginGrant {
                access_token: "access-1".to_string(),
                refresh_token: "refresh-1".to_string(),
                principal: clerk(),
            })),
            refresh: Mutex::new(Ok("access-2".to_string())),
            profile: Mutex::new(Ok(clerk())),
            role_table: Mutex::new(Ok(Vec::new())),
            principal_roles: Mutex::new(HashMap::new()),
            refresh_gate: Mutex::new(None),
        })
    }

    pub fn set_login(&self, result: Result<LoginGrant, CollabError>) {
        *self.login.lock() = result;
    }

    pub fn set_refresh(&self, result: Result<String, CollabError>) {
        *self.refresh.lock() = result;
    }

    pub fn set_profile(&self, result: Result<Principal, CollabError>) {
        *self.profile.lock() = result;
    }

    pub fn set_role_table(&self, result: Result<Vec<RoleAssignmentRecord>, CollabError>) {
        *self.role_table.lock() = result;
    }

    pub fn set_principal_roles(&self, principal_id: &str, roles: &[&str]) {
        self.principal_roles
            .lock()
            .insert(principal_id.to_string(), roles.iter().map(|s| s.to_string()).collect());
    }

    /// Block refresh exchanges until `release_refreshes`
    pub fn hold_refreshes(&self) {
        *self.refresh_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_refreshes(&self) {
        if let Some(gate) = self.refresh_gate.lock().take() {
            gate.add_permits(1024);
        }
    }

    /// Refresh and profile calls made so far
    pub fn network_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst) + self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            issuer: self.clone(),
            profiles: self.clone(),
            roles: self.clone(),
        }
    }
}

#[async_trait]
impl Issuer for MockBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginGrant, CollabError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login.lock().clone()
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<String, CollabError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        self.refresh.lock().clone()
    }
}

#[async_trait]
impl ProfileSource for MockBackend {
    async fn get_profile(&self, _access_token: &str) -> Result<Principal, CollabError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile.lock().clone()
    }
}

#[async_trait]
impl RoleSource for MockBackend {
    async fn get_role_assignments(&self) -> Result<Vec<RoleAssignmentRecord>, CollabError> {
        self.role_table_calls.fetch_add(1, Ordering::SeqCst);
        self.role_table.lock().clone()
    }

    async fn get_principal_roles(&self, principal_id: &str) -> Result<PrincipalRoles, CollabError> {
        Ok(PrincipalRoles {
            roles: self
                .principal_roles
                .lock()
                .get(principal_id)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

/// A context over the given profile, wired to the mock backend
pub fn context_with(
    backend: &Arc<MockBackend>,
    storage: Arc<dyn SessionStorage>,
    transport: Arc<dyn MarkerTransport>,
) -> SessionContext {
    fincheck_session::init_tracing();
    SessionContext::new(backend.collaborators(), storage, transport, &test_config())
}

/// A lone context over fresh in-memory storage
pub fn lone_context(backend: &Arc<MockBackend>) -> (SessionContext, MemoryStorage) {
    let storage = MemoryStorage::new();
    let ctx = context_with(backend, Arc::new(storage.clone()), Arc::new(ChannelTransport::new()));
    (ctx, storage)
}

/// Wait until the state satisfies `predicate`
pub async fn wait_for_state<F>(mut rx: watch::Receiver<SessionState>, predicate: F) -> Result<SessionState>
where
    F: Fn(&SessionState) -> bool,
{
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .context("state did not change within timeout")??
        .clone();
    Ok(state)
}
