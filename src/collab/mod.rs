//! Trusted collaborators consumed by the session core.
//!
//! The issuer, profile service and role-table service are black boxes. Each
//! failure is classified as an explicit credential rejection, a transient
//! problem, or an unexpected response, so callers never treat a dropped
//! connection like a revoked token.

pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Credentials, Principal};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollabError {
    #[error("Credentials rejected: {0}")]
    AuthExpired(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

impl CollabError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, CollabError::AuthExpired(_))
    }
}

/// Result of a successful login exchange
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(alias = "user")]
    pub principal: Principal,
}

impl std::fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGrant")
            .field("access_token", &crate::auth::fingerprint(&self.access_token))
            .field("refresh_token", &crate::auth::fingerprint(&self.refresh_token))
            .field("principal", &self.principal)
            .finish()
    }
}

/// Raw role-table row as served by the role-management service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentRecord {
    pub role: String,
    #[serde(default)]
    pub job_titles: Vec<String>,
    #[serde(default)]
    pub principals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRoles {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[async_trait]
pub trait Issuer: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, CollabError>;

    /// Exchange a refresh token for a new access token
    async fn refresh_token(&self, refresh_token: &str) -> Result<String, CollabError>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn get_profile(&self, access_token: &str) -> Result<Principal, CollabError>;
}

#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn get_role_assignments(&self) -> Result<Vec<RoleAssignmentRecord>, CollabError>;

    async fn get_principal_roles(&self, principal_id: &str) -> Result<PrincipalRoles, CollabError>;
}
