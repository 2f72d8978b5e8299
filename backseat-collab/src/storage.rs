use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::warn;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// The host's sticky session id
pub const HOST_SID_KEY: &str = "host_sid";
/// The host's streaming token JSON
pub const TOKENS_KEY: &str = "spotify_tokens";
/// The active guest identity
pub const CURRENT_USER_KEY: &str = "currentUser";

/// The key a local user record is kept under
pub fn user_key(username: &str) -> String {
    format!("user:{}", username)
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not access local storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not encode or decode a stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per device string storage, surviving reloads
pub trait LocalStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// JSON helpers on top of [LocalStorage]
pub trait LocalStorageExt: LocalStorage {
    /// Returns the decoded value, or [None] if it's missing or doesn't decode
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring undecodable value under {}: {}", key, err);
                None
            }
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<S: LocalStorage + ?Sized> LocalStorageExt for S {}

/// Storage that forgets everything when dropped
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON file, written through on every change
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Opens the file, starting empty if it doesn't exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)?;

        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());

        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();

        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    #[test]
    fn test_json_roundtrip_and_garbage() {
        let storage = MemoryStorage::new();

        storage
            .set_json("record", &Record { name: "ana".into() })
            .unwrap();
        storage.set("garbage", "{not json").unwrap();

        assert_eq!(
            storage.get_json::<Record>("record"),
            Some(Record { name: "ana".into() })
        );
        assert_eq!(storage.get_json::<Record>("garbage"), None);
        assert_eq!(storage.get_json::<Record>("missing"), None);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "backseat-storage-{}.json",
            backseat_core::random_string(8)
        ));

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set(HOST_SID_KEY, "S1").unwrap();
            storage.set("temporary", "x").unwrap();
            storage.remove("temporary").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(HOST_SID_KEY).as_deref(), Some("S1"));
        assert_eq!(reopened.get("temporary"), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_user_key() {
        assert_eq!(user_key("alice"), "user:alice");
    }
}
