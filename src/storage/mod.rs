//! Persisted key/value storage shared by every context of one profile.
//!
//! Values are plain strings, mirroring the browser storage the session core
//! was designed around. Writers use last-writer-wins; readers re-derive their
//! state after a broadcast instead of merging.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const PRINCIPAL_KEY: &str = "user";
pub const MARKER_KEY: &str = "sessionEvent";

/// Keys written by the session store itself
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, PRINCIPAL_KEY];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed storage document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Must be durable when it returns
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Read a key, treating read failures as absence
    fn get_or_absent(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!("Storage read of '{}' failed, treating as absent: {}", key, e);
                None
            }
        }
    }
}
