// Shared types used across the session core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user or device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(alias = "displayName", alias = "name")]
    pub display_name: String,
    #[serde(alias = "jobTitle")]
    pub job_title: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, job_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            job_title: job_title.into(),
            language: None,
            avatar: None,
        }
    }

    /// Merge a profile edit into this principal. The id is never patched.
    pub fn apply(&mut self, patch: PrincipalPatch) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(job_title) = patch.job_title {
            self.job_title = job_title;
        }
        if let Some(language) = patch.language {
            self.language = Some(language);
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = Some(avatar);
        }
    }
}

/// Partial profile update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalPatch {
    pub display_name: Option<String>,
    pub job_title: Option<String>,
    pub language: Option<String>,
    pub avatar: Option<String>,
}

/// Access/refresh token pair plus issuance time
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl CredentialBundle {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        let access_token = access_token.into();
        let issued_at = crate::auth::issued_at(&access_token).unwrap_or_else(Utc::now);
        Self {
            access_token,
            refresh_token,
            issued_at,
        }
    }
}

// Tokens stay out of Debug output so they never land in logs
impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("access_token", &crate::auth::fingerprint(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(crate::auth::fingerprint))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Principal and credentials of an authenticated context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
    pub credentials: CredentialBundle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Authenticated(Session),
    Unauthenticated,
}

impl SessionState {
    pub fn is_resolving(&self) -> bool {
        matches!(self, SessionState::Resolving)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(session) => Some(&session.principal),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<&CredentialBundle> {
        match self {
            SessionState::Authenticated(session) => Some(&session.credentials),
            _ => None,
        }
    }
}

/// Login form input handed to the issuer
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
