//! Node configuration
//!
//! Two kinds of settings:
//! - [`NodeConfig`]: static board description, read once at boot from JSON
//!   (every field has a default matching the production board)
//! - [`SamplingPeriod`]: the one runtime-tunable setting, shared by the
//!   acquisition loop and both control protocols, persisted on change
//!
//! ## Example
//!
//! ```rust
//! use fieldnode_core::config::NodeConfig;
//!
//! let config: NodeConfig = serde_json::from_str(r#"{"device_name":"bench-7"}"#).unwrap();
//! assert_eq!(config.device_name, "bench-7");
//! assert_eq!(config.relay_pins, [25, 27, 32, 26]);
//! ```

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_RELAY_PINS, DEFAULT_SAMPLING_INTERVAL_MS, KEY_SAMPLING_INTERVAL,
    MAX_SAMPLING_INTERVAL_MS, MIN_SAMPLING_INTERVAL_MS, RELAY_COUNT,
};
use crate::errors::ConfigError;
use crate::store::KeyValueStore;
use crate::traits::{DataRate, Gain, InputMux};

// ===== STATIC CONFIGURATION =====

/// One ADC channel on the shared bus
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 7-bit bus address
    pub address: u8,
    pub gain: Gain,
    pub data_rate: DataRate,
    pub input: InputMux,
    /// A required channel that fails to initialise stops the boot
    pub required: bool,
}

impl ChannelConfig {
    /// Channel 1: shunt differential on AIN0-AIN1
    pub fn shunt() -> Self {
        Self {
            address: 0x48,
            gain: Gain::Eight,
            data_rate: DataRate::Sps860,
            input: InputMux::Differential01,
            required: true,
        }
    }

    /// Channel 2: auxiliary single-ended AIN0
    pub fn auxiliary() -> Self {
        Self {
            address: 0x49,
            gain: Gain::One,
            data_rate: DataRate::Sps860,
            input: InputMux::SingleEnded0,
            required: false,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::shunt()
    }
}

fn default_device_name() -> String {
    "FieldNode".to_owned()
}

fn default_rpc_address() -> String {
    "0.0.0.0:9000".to_owned()
}

fn default_store_path() -> String {
    "fieldnode-store.json".to_owned()
}

/// Board description loaded at boot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name announced to radio and socket clients
    pub device_name: String,
    /// Relay GPIO pins in logical order
    pub relay_pins: [u8; RELAY_COUNT],
    pub shunt: ChannelConfig,
    pub auxiliary: ChannelConfig,
    /// Listen address of the socket RPC server
    pub rpc_address: String,
    /// Path of the persisted key-value file
    pub store_path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            relay_pins: DEFAULT_RELAY_PINS,
            shunt: ChannelConfig::shunt(),
            auxiliary: ChannelConfig::auxiliary(),
            rpc_address: default_rpc_address(),
            store_path: default_store_path(),
        }
    }
}

impl NodeConfig {
    /// Reject configurations the node cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "device name is empty",
            });
        }
        for (i, pin) in self.relay_pins.iter().enumerate() {
            if self.relay_pins[..i].contains(pin) {
                return Err(ConfigError::Invalid {
                    reason: "relay pins must be distinct",
                });
            }
        }
        if self.shunt.address == self.auxiliary.address {
            return Err(ConfigError::Invalid {
                reason: "ADC channels share a bus address",
            });
        }
        if self.shunt.address > 0x7F || self.auxiliary.address > 0x7F {
            return Err(ConfigError::Invalid {
                reason: "bus address is not 7-bit",
            });
        }
        Ok(())
    }
}

// ===== SAMPLING PERIOD =====

/// Check a requested sampling period against the accepted range
pub fn validate_sampling_interval(ms: u32) -> Result<u16, ConfigError> {
    if ms < MIN_SAMPLING_INTERVAL_MS as u32 || ms > MAX_SAMPLING_INTERVAL_MS as u32 {
        return Err(ConfigError::SamplingOutOfRange {
            value: ms,
            min: MIN_SAMPLING_INTERVAL_MS,
            max: MAX_SAMPLING_INTERVAL_MS,
        });
    }
    Ok(ms as u16)
}

/// Shared, persisted acquisition period
#[derive(Clone)]
pub struct SamplingPeriod {
    ms: Arc<AtomicU16>,
    store: Arc<dyn KeyValueStore>,
}

impl SamplingPeriod {
    /// Start at the default period
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            ms: Arc::new(AtomicU16::new(DEFAULT_SAMPLING_INTERVAL_MS)),
            store,
        }
    }

    /// Load the persisted period, falling back to the default when it is
    /// missing or out of range
    pub fn restore(store: Arc<dyn KeyValueStore>) -> Self {
        let period = Self::new(store);
        match period.store.get_u32(KEY_SAMPLING_INTERVAL) {
            Ok(Some(ms)) => match validate_sampling_interval(ms) {
                Ok(ms) => period.ms.store(ms, Ordering::Relaxed),
                Err(e) => warn!("ignoring persisted sampling interval: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("could not read persisted sampling interval: {}", e),
        }
        info!("sampling interval {} ms", period.millis());
        period
    }

    pub fn millis(&self) -> u16 {
        self.ms.load(Ordering::Relaxed)
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.millis() as u64)
    }

    /// Validate, apply and persist a new period.
    ///
    /// The new value takes effect from the next acquisition cycle. A failed
    /// write to the store is logged; the running value is still updated.
    pub fn set(&self, ms: u32) -> Result<u16, ConfigError> {
        let ms = validate_sampling_interval(ms)?;
        self.ms.store(ms, Ordering::Relaxed);
        if let Err(e) = self.store.put_u32(KEY_SAMPLING_INTERVAL, ms as u32) {
            warn!("could not persist sampling interval: {}", e);
        }
        info!("sampling interval set to {} ms", ms);
        Ok(ms)
    }
}
