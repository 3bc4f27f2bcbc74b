//! Acquisition and fault-recovery engine for FieldNode
//!
//! Samples two ADCs on a shared I2C bus, keeps a moving-average window per
//! channel and owns the four relay outputs. Bus faults degrade to stale
//! readings instead of propagating; a device that keeps failing is parked and
//! re-probed on a timer.
//!
//! Key constraints:
//! - Acquisition never blocks on a dispatcher for more than 10 ms
//! - Both channels of a tick become visible to readers together
//! - Relay state always mirrors the physical outputs and is persisted on change
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldnode_core::{Channel, CalibrationEngine};
//!
//! async fn recalibrate(channel: Arc<Channel>) {
//!     match CalibrationEngine::new().calibrate(&channel).await {
//!         Ok(offset) => println!("offset {offset:.2}"),
//!         Err(e) => println!("kept previous offset: {e}"),
//!     }
//! }
//! ```

#![deny(unsafe_code)]

pub mod acquisition;
pub mod buffer;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod drivers;
pub mod errors;
pub mod relay;
pub mod sensor;
pub mod state;
pub mod store;
pub mod time;
pub mod traits;

// Public API
pub use acquisition::{AcquisitionLoop, AcquisitionStats, TickOutcome};
pub use calibration::{CalibrationEngine, Channel};
pub use config::{ChannelConfig, NodeConfig, SamplingPeriod};
pub use drivers::Ads1115;
pub use errors::{
    BusError, BusResult, CalibrationError, ConfigError, OutputFault, RelayError, SensorError,
    StateError, StoreError,
};
pub use relay::{RelayBank, RelayChange};
pub use sensor::{Reading, SensorHealthTracker};
pub use state::{SharedTelemetryState, TelemetrySnapshot, TimedMutex};
pub use store::{KeyValueStore, MemoryStore};
pub use time::{ManualClock, MonotonicClock, TimeSource, Timestamp};
pub use traits::{BusDevice, DataRate, Gain, HalOutput, InputMux, OutputDriver};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
