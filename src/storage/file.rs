use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{SessionStorage, StorageError};

const DOCUMENT_NAME: &str = "session.json";
const LOCK_NAME: &str = "session.lock";

/// Profile storage kept as one JSON document in a profile directory.
///
/// Every write replaces the document through a temp file and rename, so a
/// reader in another process sees either the old or the new document.
/// Writers take an exclusive lock on a sibling lock file for the whole
/// read-modify-write, so handles in any process never drop each other's keys.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

pub fn get_profile_dir(configured: Option<&Path>) -> anyhow::Result<PathBuf> {
    let profile_dir = if let Some(dir) = configured {
        dir.to_path_buf()
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("fincheck").join("session")
    };

    if !profile_dir.exists() {
        fs::create_dir_all(&profile_dir)?;
    }

    Ok(profile_dir)
}

impl FileStorage {
    pub fn open(profile_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = get_profile_dir(Some(profile_dir.as_ref()))?;
        Ok(Self {
            path: dir.join(DOCUMENT_NAME),
            lock_path: dir.join(LOCK_NAME),
        })
    }

    /// Open the profile configured in `StorageConfig`, or the default under $HOME
    pub fn from_config(config: &crate::config::StorageConfig) -> anyhow::Result<Self> {
        let dir = get_profile_dir(config.dir.as_deref())?;
        Self::open(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    // Released when the returned file is dropped
    fn lock_exclusive(&self) -> Result<File, StorageError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        FileExt::lock_exclusive(&lock_file)?;
        Ok(lock_file)
    }

    fn load_for_write(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.load() {
            Err(StorageError::Malformed(e)) => {
                tracing::warn!("Discarding malformed session document {}: {}", self.path.display(), e);
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(values)?;
        // Unique per write so two handles on one profile never share a temp file
        let tmp = self.path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _lock = self.lock_exclusive()?;
        let mut values = self.load_for_write()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _lock = self.lock_exclusive()?;
        let mut values = self.load_for_write()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}
