//! Credential store collaborator.
//!
//! The manager persists the raw connection string through the
//! [`CredentialStore`] trait. [`FileCredentialStore`] is a staged
//! key/value blob store backed by a JSON file: `save`/`erase` change the
//! in-memory map and `commit` writes it out.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::debug;

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored value is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Key/value blob storage for credentials.
///
/// Calls are synchronous and never overlap: the store is owned by a
/// single manager.
pub trait CredentialStore: Send {
    /// Returns the blob stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stages `value` under `key`.
    fn save(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Stages removal of `key`.
    fn erase(&mut self, key: &str) -> Result<(), StoreError>;

    /// Makes staged changes durable.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// File-backed [`CredentialStore`].
///
/// Values are base64 strings in a flat JSON object.
pub struct FileCredentialStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileCredentialStore {
    /// Opens the store, loading existing entries from disk.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let entries = load_entries(&path)?;
        Ok(Self { path, entries })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.entries
            .get(key)
            .map(|v| STANDARD.decode(v))
            .transpose()
            .map_err(StoreError::from)
    }

    fn save(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), STANDARD.encode(value));
        Ok(())
    }

    fn erase(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!("committed {} credential(s) to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

/// Loads entries from a JSON file on disk.
fn load_entries(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let entries: HashMap<String, String> = serde_json::from_str(&data)?;
    debug!("loaded {} credential(s) from {:?}", entries.len(), path);
    Ok(entries)
}

/// Directory name under the user's config directory.
const APP_DIR: &str = "iothub-health";

/// Returns the default credential store path, `<app dir>/credentials.json`.
pub fn default_store_path() -> Option<PathBuf> {
    app_dir().map(|d| d.join("credentials.json"))
}

/// Returns the per-user directory holding config and credentials.
///
/// `%APPDATA%\iothub-health` on Windows, otherwise
/// `$XDG_CONFIG_HOME/iothub-health` falling back to `~/.config/iothub-health`.
pub fn app_dir() -> Option<PathBuf> {
    app_dir_from(|name| std::env::var_os(name))
}

fn app_dir_from(var: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let non_empty = |name: &str| var(name).filter(|v| !v.is_empty()).map(PathBuf::from);

    let base = if cfg!(windows) {
        non_empty("APPDATA")
    } else {
        non_empty("XDG_CONFIG_HOME").or_else(|| non_empty("HOME").map(|h| h.join(".config")))
    };
    base.map(|b| b.join(APP_DIR))
}
