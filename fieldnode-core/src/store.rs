//! Persistent key-value settings
//!
//! Relay states, the sampling period and network credentials survive reboots
//! through a small typed store. The firmware binary backs it with a JSON file;
//! [`MemoryStore`] is used by tests and as a scratch store when no path is
//! configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::StoreError;

/// Typed persistent settings store
///
/// Getters return `Ok(None)` for a key that was never written or whose stored
/// value has another type.
pub trait KeyValueStore: Send + Sync {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError>;
    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError>;

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StoreError>;
    fn put_u32(&self, key: &str, value: u32) -> Result<(), StoreError>;

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Value held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Bool(bool),
    U32(u32),
    Text(String),
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_*` fail with [`StoreError::Io`]
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw stored value, if any
    pub fn value(&self, key: &str) -> Option<StoredValue> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Io)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io);
        }
        let mut entries = self.entries.lock().map_err(|_| StoreError::Io)?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(match self.get(key)? {
            Some(StoredValue::Bool(v)) => Some(v),
            _ => None,
        })
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, StoredValue::Bool(value))
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StoreError> {
        Ok(match self.get(key)? {
            Some(StoredValue::U32(v)) => Some(v),
            _ => None,
        })
    }

    fn put_u32(&self, key: &str, value: u32) -> Result<(), StoreError> {
        self.put(key, StoredValue::U32(value))
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(match self.get(key)? {
            Some(StoredValue::Text(v)) => Some(v),
            _ => None,
        })
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, StoredValue::Text(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip_and_mismatch() {
        let store = MemoryStore::new();
        store.put_u32("samplingIntervalMs", 20).unwrap();
        store.put_bool("relay0", true).unwrap();

        assert_eq!(store.get_u32("samplingIntervalMs").unwrap(), Some(20));
        assert_eq!(store.get_bool("relay0").unwrap(), Some(true));
        assert_eq!(store.get_bool("samplingIntervalMs").unwrap(), None);
        assert_eq!(store.get_string("ssid").unwrap(), None);
    }

    #[test]
    fn failing_writes_leave_previous_value() {
        let store = MemoryStore::new();
        store.put_string("ssid", "home").unwrap();
        store.fail_writes(true);

        assert_eq!(store.put_string("ssid", "work"), Err(StoreError::Io));
        assert_eq!(store.get_string("ssid").unwrap().as_deref(), Some("home"));
    }
}
