//! JSON-file backed settings store
//!
//! The whole store is one flat JSON object. Every write rewrites the file
//! through a temporary sibling and a rename, so a crash mid-write leaves the
//! previous contents intact.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use serde_json::{Map, Value};

use fieldnode_core::{KeyValueStore, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("store {}: not a JSON object", path.display());
                    return Err(StoreError::Codec);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("store {}: {}", path.display(), e);
                return Err(StoreError::Io);
            }
        };
        debug!("store {}: {} entries", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Io)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Io)?;
        let previous = entries.insert(key.to_owned(), value);
        if let Err(e) = self.flush(&entries) {
            // Keep memory and disk in agreement
            match previous {
                Some(previous) => entries.insert(key.to_owned(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn flush(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(entries).map_err(|_| StoreError::Codec)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        fs::write(&staging, text).map_err(|_| StoreError::Io)?;
        fs::rename(&staging, &self.path).map_err(|_| StoreError::Io)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.get(key)?.and_then(|v| v.as_bool()))
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, Value::Bool(value))
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StoreError> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok()))
    }

    fn put_u32(&self, key: &str, value: u32) -> Result<(), StoreError> {
        self.put(key, Value::from(value))
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_str().map(str::to_owned)))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, Value::from(value))
    }
}
