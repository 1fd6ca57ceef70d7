// Session core error types
use thiserror::Error;

use crate::collab::CollabError;

/// Errors surfaced by the session core to route/menu components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Refresh exchange or profile fetch rejected the credentials
    #[error("Authentication expired: {0}")]
    AuthenticationExpired(String),

    /// Access resolver denied a capability
    #[error("Access denied to '{capability}'")]
    AuthorizationDenied { capability: String },

    /// Connectivity problem reaching a collaborator, retried on the next trigger
    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    /// Persisted session data could not be parsed
    #[error("Corrupt persisted state: {0}")]
    CorruptPersistedState(String),

    /// Issuer refused the submitted login credentials
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// Persisting session data failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn authorization_denied(capability: impl Into<String>) -> Self {
        SessionError::AuthorizationDenied {
            capability: capability.into(),
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::AuthenticationExpired(_) => "AUTHENTICATION_EXPIRED",
            SessionError::AuthorizationDenied { .. } => "AUTHORIZATION_DENIED",
            SessionError::TransientNetwork(_) => "TRANSIENT_NETWORK_FAILURE",
            SessionError::CorruptPersistedState(_) => "CORRUPT_PERSISTED_STATE",
            SessionError::Rejected(_) => "LOGIN_REJECTED",
            SessionError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Client-safe message for inline notices
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::AuthenticationExpired(_) => "Your session has expired. Please sign in again.",
            SessionError::AuthorizationDenied { .. } => "You do not have permission to access this feature.",
            SessionError::TransientNetwork(_) => "Connection problem. Retrying shortly.",
            SessionError::CorruptPersistedState(_) => "Please sign in again.",
            SessionError::Rejected(_) => "Invalid username or password.",
            SessionError::Storage(_) => "Your session could not be saved on this device.",
        }
    }

    /// Only an expired authentication tears the session down
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::AuthenticationExpired(_))
    }
}

impl From<CollabError> for SessionError {
    fn from(err: CollabError) -> Self {
        match err {
            CollabError::AuthExpired(msg) => SessionError::AuthenticationExpired(msg),
            CollabError::Transient(msg) => SessionError::TransientNetwork(msg),
            CollabError::Protocol(msg) => {
                tracing::error!("Collaborator protocol error: {}", msg);
                SessionError::TransientNetwork(msg)
            }
        }
    }
}

impl From<crate::storage::StorageError> for SessionError {
    fn from(err: crate::storage::StorageError) -> Self {
        SessionError::Storage(err.to_string())
    }
}
