pub mod access;
pub mod auth;
pub mod collab;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod types;

pub use error::SessionError;
pub use session::SessionContext;
pub use types::{CredentialBundle, Credentials, Principal, PrincipalPatch, Session, SessionState};

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
