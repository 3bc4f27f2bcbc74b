//! Relay outputs
//!
//! Four digital outputs addressed either by GPIO pin (radio protocol) or by
//! logical index (socket protocol). The logical state only changes after the
//! physical output was driven successfully, and every mutation is written to
//! the key-value store immediately under `relay<index>`.

use std::sync::Arc;

use heapless::Vec;
use log::{info, warn};

use crate::constants::{KEY_RELAY_PREFIX, RELAY_COUNT};
use crate::errors::{ConfigError, RelayError};
use crate::store::KeyValueStore;
use crate::traits::OutputDriver;

/// Result of a successful relay mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayChange {
    pub index: usize,
    pub pin: u8,
    pub on: bool,
}

/// Persisted key for the relay at `index`
pub fn relay_key(index: usize) -> String {
    format!("{}{}", KEY_RELAY_PREFIX, index)
}

/// The node's relay outputs
pub struct RelayBank {
    pins: [u8; RELAY_COUNT],
    states: [bool; RELAY_COUNT],
    outputs: Vec<Box<dyn OutputDriver>, RELAY_COUNT>,
    store: Arc<dyn KeyValueStore>,
}

impl RelayBank {
    /// Build a bank from one output per pin, in logical order.
    ///
    /// All outputs start logically off; call [`restore`](Self::restore) to
    /// apply the persisted states.
    pub fn new(
        pins: [u8; RELAY_COUNT],
        outputs: impl IntoIterator<Item = Box<dyn OutputDriver>>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ConfigError> {
        let mut bank: Vec<Box<dyn OutputDriver>, RELAY_COUNT> = Vec::new();
        for output in outputs {
            bank.push(output).map_err(|_| ConfigError::Invalid {
                reason: "more relay outputs than relay pins",
            })?;
        }
        if bank.len() != RELAY_COUNT {
            return Err(ConfigError::Invalid {
                reason: "one relay output per pin required",
            });
        }

        Ok(Self {
            pins,
            states: [false; RELAY_COUNT],
            outputs: bank,
            store,
        })
    }

    /// Apply persisted states (missing keys mean off) to the outputs
    pub fn restore(&mut self) {
        for index in 0..RELAY_COUNT {
            let on = match self.store.get_bool(&relay_key(index)) {
                Ok(value) => value.unwrap_or(false),
                Err(e) => {
                    warn!("relay {}: could not read persisted state: {}", index, e);
                    false
                }
            };
            match self.outputs[index].drive(on) {
                Ok(()) => self.states[index] = on,
                Err(e) => warn!("relay pin {}: restore failed: {}", self.pins[index], e),
            }
        }
        info!("relays restored: {:?}", self.states);
    }

    pub fn index_of(&self, pin: u8) -> Option<usize> {
        self.pins.iter().position(|&p| p == pin)
    }

    pub fn pin(&self, index: usize) -> Option<u8> {
        self.pins.get(index).copied()
    }

    pub fn pins(&self) -> [u8; RELAY_COUNT] {
        self.pins
    }

    pub fn state(&self, index: usize) -> Option<bool> {
        self.states.get(index).copied()
    }

    pub fn states(&self) -> [bool; RELAY_COUNT] {
        self.states
    }

    /// Drive the relay on `pin` to `on`
    pub fn set_pin(&mut self, pin: u8, on: bool) -> Result<RelayChange, RelayError> {
        let index = self.index_of(pin).ok_or(RelayError::UnknownPin { pin })?;
        self.apply(index, on)
    }

    /// Flip the relay on `pin`
    pub fn toggle_pin(&mut self, pin: u8) -> Result<RelayChange, RelayError> {
        let index = self.index_of(pin).ok_or(RelayError::UnknownPin { pin })?;
        self.apply(index, !self.states[index])
    }

    /// Drive the relay at logical `index` to `on`
    pub fn set_index(&mut self, index: usize, on: bool) -> Result<RelayChange, RelayError> {
        if index >= RELAY_COUNT {
            return Err(RelayError::UnknownIndex { index });
        }
        self.apply(index, on)
    }

    fn apply(&mut self, index: usize, on: bool) -> Result<RelayChange, RelayError> {
        let pin = self.pins[index];
        self.outputs[index]
            .drive(on)
            .map_err(|_| RelayError::Output { pin })?;
        self.states[index] = on;

        // Persistence failure does not undo the physical change
        if let Err(e) = self.store.put_bool(&relay_key(index), on) {
            warn!("relay pin {}: could not persist state: {}", pin, e);
        }

        Ok(RelayChange { index, pin, on })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_RELAY_PINS;
    use crate::errors::OutputFault;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeOutput {
        level: Arc<AtomicBool>,
        broken: bool,
    }

    impl OutputDriver for FakeOutput {
        fn drive(&mut self, high: bool) -> Result<(), OutputFault> {
            if self.broken {
                return Err(OutputFault);
            }
            self.level.store(high, Ordering::SeqCst);
            Ok(())
        }
    }

    fn bank(store: Arc<MemoryStore>, broken: usize) -> (RelayBank, Vec<Arc<AtomicBool>, 4>) {
        let mut levels = Vec::new();
        let mut outputs: std::vec::Vec<Box<dyn OutputDriver>> = std::vec::Vec::new();
        for i in 0..RELAY_COUNT {
            let level = Arc::new(AtomicBool::new(false));
            levels.push(level.clone()).unwrap();
            outputs.push(Box::new(FakeOutput {
                level,
                broken: i == broken,
            }));
        }
        (RelayBank::new(DEFAULT_RELAY_PINS, outputs, store).unwrap(), levels)
    }

    #[test]
    fn set_is_idempotent_and_persists_each_time() {
        let store = Arc::new(MemoryStore::new());
        let (mut relays, levels) = bank(store.clone(), usize::MAX);

        let first = relays.set_pin(25, true).unwrap();
        let second = relays.set_pin(25, true).unwrap();

        assert_eq!(first, second);
        assert_eq!(relays.state(0), Some(true));
        assert!(levels[0].load(Ordering::SeqCst));
        assert_eq!(store.get_bool("relay0").unwrap(), Some(true));
    }

    #[test]
    fn toggle_flips_by_pin() {
        let store = Arc::new(MemoryStore::new());
        let (mut relays, _) = bank(store.clone(), usize::MAX);

        assert!(relays.toggle_pin(32).unwrap().on);
        assert!(!relays.toggle_pin(32).unwrap().on);
        assert_eq!(store.get_bool("relay2").unwrap(), Some(false));
    }

    #[test]
    fn unknown_pin_and_index_rejected() {
        let (mut relays, _) = bank(Arc::new(MemoryStore::new()), usize::MAX);

        assert_eq!(relays.set_pin(99, true), Err(RelayError::UnknownPin { pin: 99 }));
        assert_eq!(relays.set_index(4, true), Err(RelayError::UnknownIndex { index: 4 }));
    }

    #[test]
    fn failed_drive_leaves_logical_state() {
        let store = Arc::new(MemoryStore::new());
        let (mut relays, _) = bank(store.clone(), 1);

        assert_eq!(relays.set_pin(27, true), Err(RelayError::Output { pin: 27 }));
        assert_eq!(relays.state(1), Some(false));
        assert_eq!(store.get_bool("relay1").unwrap(), None);
    }

    #[test]
    fn restore_applies_persisted_states() {
        let store = Arc::new(MemoryStore::new());
        store.put_bool("relay3", true).unwrap();
        let (mut relays, levels) = bank(store, usize::MAX);

        relays.restore();
        assert_eq!(relays.states(), [false, false, false, true]);
        assert!(levels[3].load(Ordering::SeqCst));
    }
}
