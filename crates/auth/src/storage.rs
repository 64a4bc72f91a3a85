//! Local persistence for the auth session
//!
//! Native targets keep the session in the platform secure store
//! ([`KeyringStorage`]); targets without one use a local key-value file
//! ([`FileStorage`]). [`MemoryStorage`] keeps nothing across restarts.

use keyring::Entry;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::AuthError;

/// Key-value store the session is persisted in
pub trait SessionStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError>;
    fn save(&self, key: &str, value: &str) -> Result<(), AuthError>;
    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.items().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.items().remove(key);
        Ok(())
    }
}

/// JSON object file holding one entry per key
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, AuthError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_all(&self, items: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AuthError::Storage(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        let contents = serde_json::to_string(items)?;
        fs::write(&self.path, contents).map_err(|e| {
            AuthError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl SessionStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut items = self.read_all()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

/// Platform secure store (Keychain, Credential Manager, Secret Service)
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, AuthError> {
        Entry::new(&self.service, key)
            .map_err(|e| AuthError::Storage(format!("Keyring entry {} unavailable: {}", key, e)))
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to read {} from keyring: {}",
                key, e
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), AuthError> {
        debug!("Storing {} in keyring service {}", key, self.service);
        self.entry(key)?
            .set_password(value)
            .map_err(|e| AuthError::Storage(format!("Failed to store {} in keyring: {}", key, e)))
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to delete {} from keyring: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("k").unwrap(), None);

        storage.save("k", "v").unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("v"));

        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert_eq!(storage.load("k").unwrap(), None);
    }

    #[test]
    fn test_file_storage_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested").join("session.json"));

        assert_eq!(storage.load("session").unwrap(), None);
        storage.save("session", "{\"a\":1}").unwrap();
        storage.save("other", "x").unwrap();
        storage.remove("session").unwrap();

        let reopened = FileStorage::new(dir.path().join("nested").join("session.json"));
        assert_eq!(reopened.load("session").unwrap(), None);
        assert_eq!(reopened.load("other").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.load("session"),
            Err(AuthError::SerializationError(_))
        ));
    }
}
