use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub broadcast: BroadcastConfig,
    pub issuer: IssuerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub refresh_interval_secs: u64,
    pub refresh_retry_secs: u64,
    pub expiry_leeway_secs: u64,
    pub entry_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub dir: Option<PathBuf>,
    pub legacy_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_retry(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_secs)
    }

    pub fn expiry_leeway(&self) -> Duration {
        Duration::from_secs(self.expiry_leeway_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        AppConfig::development().session
    }
}

impl BroadcastConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Session overrides
        if let Ok(v) = env::var("SESSION_REFRESH_INTERVAL_SECS") {
            self.session.refresh_interval_secs = v.parse().unwrap_or(self.session.refresh_interval_secs);
        }
        if let Ok(v) = env::var("SESSION_REFRESH_RETRY_SECS") {
            self.session.refresh_retry_secs = v.parse().unwrap_or(self.session.refresh_retry_secs);
        }
        if let Ok(v) = env::var("SESSION_EXPIRY_LEEWAY_SECS") {
            self.session.expiry_leeway_secs = v.parse().unwrap_or(self.session.expiry_leeway_secs);
        }
        if let Ok(v) = env::var("SESSION_ENTRY_PATH") {
            self.session.entry_path = v;
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_DIR") {
            self.storage.dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("STORAGE_LEGACY_KEYS") {
            self.storage.legacy_keys = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Broadcast overrides
        if let Ok(v) = env::var("BROADCAST_POLL_INTERVAL_MS") {
            self.broadcast.poll_interval_ms = v.parse().unwrap_or(self.broadcast.poll_interval_ms);
        }

        // Issuer overrides
        if let Ok(v) = env::var("ISSUER_BASE_URL") {
            self.issuer.base_url = v;
        }
        if let Ok(v) = env::var("ISSUER_REQUEST_TIMEOUT_SECS") {
            self.issuer.request_timeout_secs = v.parse().unwrap_or(self.issuer.request_timeout_secs);
        }

        self
    }

    fn default_legacy_keys() -> Vec<String> {
        vec!["token".to_string(), "userInfo".to_string(), "userId".to_string()]
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            session: SessionConfig {
                refresh_interval_secs: 20 * 60,
                refresh_retry_secs: 30,
                expiry_leeway_secs: 60,
                entry_path: "/".to_string(),
            },
            storage: StorageConfig {
                dir: None,
                legacy_keys: Self::default_legacy_keys(),
            },
            broadcast: BroadcastConfig {
                poll_interval_ms: 250,
            },
            issuer: IssuerConfig {
                base_url: "http://localhost:5001".to_string(),
                request_timeout_secs: 30,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            session: SessionConfig {
                refresh_interval_secs: 20 * 60,
                refresh_retry_secs: 60,
                expiry_leeway_secs: 120,
                entry_path: "/".to_string(),
            },
            storage: StorageConfig {
                dir: None,
                legacy_keys: Self::default_legacy_keys(),
            },
            broadcast: BroadcastConfig {
                poll_interval_ms: 500,
            },
            issuer: IssuerConfig {
                base_url: "https://staging.example.com".to_string(),
                request_timeout_secs: 15,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            session: SessionConfig {
                refresh_interval_secs: 20 * 60,
                refresh_retry_secs: 60,
                expiry_leeway_secs: 120,
                entry_path: "/".to_string(),
            },
            storage: StorageConfig {
                dir: None,
                legacy_keys: Self::default_legacy_keys(),
            },
            broadcast: BroadcastConfig {
                poll_interval_ms: 1000,
            },
            issuer: IssuerConfig {
                base_url: "https://app.example.com".to_string(),
                request_timeout_secs: 10,
            },
        }
    }
}

// Read once from the environment; used by `SessionContext::from_env`
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
