//! Error Types for the Acquisition Engine
//!
//! ## Design Philosophy
//!
//! The acquisition engine sits directly on a shared serial bus, so most of what
//! can go wrong is transient. The error types reflect how far a failure is
//! allowed to travel:
//!
//! 1. **Bus errors** (`BusError`) never leave the sensor tracker. A failed read
//!    is converted into a stale-but-valid reading and counted.
//!
//! 2. **Sensor errors** (`SensorError`) surface only at boot, where a required
//!    device that cannot be initialised is the one fault that forces a restart.
//!
//! 3. **Lock timeouts** (`StateError`) are reported to whoever asked and the
//!    operation is skipped. They are never escalated.
//!
//! 4. **Configuration and relay errors** are returned to the dispatcher that
//!    issued the change so the client receives a structured message.
//!
//! All variants are `Copy` and carry only inline data so they can be returned
//! from hot paths without allocation.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use fieldnode_core::{BusError, SensorError};
//!
//! fn boot_channel(result: Result<(), SensorError>, required: bool) -> bool {
//!     match result {
//!         Ok(()) => true,
//!         Err(SensorError::NotFound { address }) if !required => {
//!             // Optional device missing - run degraded, tracker keeps probing
//!             let _ = address;
//!             false
//!         }
//!         Err(_) => {
//!             // Required device failed - restart the node
//!             false
//!         }
//!     }
//! }
//! # let _ = BusError::Timeout;
//! ```

use thiserror_no_std::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Failures of a single transaction on the shared bus
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Device did not acknowledge its address or data
    #[error("device at 0x{address:02X} did not acknowledge")]
    Nack {
        /// 7-bit bus address of the silent device
        address: u8,
    },

    /// Conversion did not complete in the allotted polls
    #[error("conversion timed out")]
    Timeout,

    /// Arbitration loss, overrun or other bus-level fault
    #[error("bus fault")]
    Bus,

    /// Read attempted before the device was configured
    #[error("device not configured")]
    NotConfigured,
}

/// Device-level failures reported by a sensor tracker
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Nothing answered at the configured address
    #[error("no device found at 0x{address:02X}")]
    NotFound {
        /// 7-bit bus address that was probed
        address: u8,
    },

    /// Device answered the probe but rejected its configuration
    #[error("device at 0x{address:02X} failed to initialise: {source}")]
    InitFailed {
        /// 7-bit bus address of the device
        address: u8,
        /// Last bus error seen during configuration
        source: BusError,
    },

    /// Device is currently marked unavailable
    #[error("sensor unavailable")]
    Unavailable,
}

/// Calibration could not produce a new offset
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// Channel was unavailable when calibration started
    #[error("channel {channel} unavailable, calibration skipped")]
    Unavailable {
        /// Channel identifier
        channel: u8,
    },

    /// Channel became unavailable part-way through sampling
    #[error("channel {channel} lost after {collected} samples, offset unchanged")]
    SensorLost {
        /// Channel identifier
        channel: u8,
        /// Good samples collected before the loss
        collected: usize,
    },
}

impl CalibrationError {
    /// Channel the failed calibration belongs to
    pub fn channel(&self) -> u8 {
        match self {
            CalibrationError::Unavailable { channel } => *channel,
            CalibrationError::SensorLost { channel, .. } => *channel,
        }
    }
}

/// Relay output errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// Pin is not one of the configured relay pins
    #[error("pin {pin} is not a relay output")]
    UnknownPin {
        /// Requested GPIO number
        pin: u8,
    },

    /// Logical relay index out of range
    #[error("relay index {index} out of range")]
    UnknownIndex {
        /// Requested index
        index: usize,
    },

    /// Physical output could not be driven; logical state left unchanged
    #[error("failed to drive relay pin {pin}")]
    Output {
        /// GPIO number that failed
        pin: u8,
    },
}

/// A digital output could not be driven
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("output driver fault")]
pub struct OutputFault;

/// Configuration errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Sampling period outside the accepted range
    #[error("sampling interval {value} ms outside [{min}, {max}]")]
    SamplingOutOfRange {
        /// Requested period in milliseconds
        value: u32,
        /// Smallest accepted period
        min: u16,
        /// Largest accepted period
        max: u16,
    },

    /// Configuration value could not be used
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What was wrong
        reason: &'static str,
    },
}

/// Key-value store failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Backing medium could not be read or written
    #[error("store I/O failure")]
    Io,

    /// Stored data could not be encoded or decoded
    #[error("store encoding failure")]
    Codec,
}

/// Shared-state access errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// Lock not acquired within the bounded wait
    #[error("shared state busy (waited {waited_ms} ms)")]
    LockTimeout {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// Relay operation failed
    #[error(transparent)]
    Relay(#[from] RelayError),
}
