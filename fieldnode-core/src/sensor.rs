//! Sensor Health Tracking
//!
//! ## Overview
//!
//! A [`SensorHealthTracker`] wraps one [`BusDevice`] and turns its fallible
//! reads into an infallible stream of values. Bus faults never leave this
//! module: a failed read returns the last good value and is counted, and a
//! device that keeps failing is parked until a timed recovery probe succeeds.
//!
//! ## State Machine
//!
//! ```text
//!              5th consecutive failure
//!   ┌───────────┐ ─────────────────────▶ ┌─────────────┐
//!   │ Available │                        │ Unavailable │
//!   └───────────┘ ◀───────────────────── └─────────────┘
//!          probe + configure succeed, tried ≥ 5 s apart
//! ```
//!
//! There is no terminal state. While unavailable the bus is only touched by
//! recovery attempts, at most once per [`RECOVERY_INTERVAL_MS`].
//!
//! ## Invariants
//!
//! - `available == true` implies fewer than [`MAX_CONSECUTIVE_ERRORS`]
//!   failures since the last successful read or recovery
//! - `available == false` implies the count reached the threshold at the
//!   last transition (or the device failed to initialise)

use std::sync::Arc;

use log::{error, info, warn};

use crate::constants::{INIT_CONFIGURE_ATTEMPTS, MAX_CONSECUTIVE_ERRORS, RECOVERY_INTERVAL_MS};
use crate::errors::{BusError, SensorError};
use crate::time::{TimeSource, Timestamp};
use crate::traits::{BusDevice, DataRate, Gain};

/// Outcome of one tracker read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Value converted during this read
    Fresh(i16),
    /// Last good value, returned because the bus read failed or was skipped
    Stale(i16),
}

impl Reading {
    /// Raw conversion value regardless of freshness
    pub fn value(self) -> i16 {
        match self {
            Reading::Fresh(v) | Reading::Stale(v) => v,
        }
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, Reading::Fresh(_))
    }
}

/// Availability, error counting and timed recovery for one bus device
pub struct SensorHealthTracker {
    id: u8,
    device: Box<dyn BusDevice>,
    clock: Arc<dyn TimeSource>,
    gain: Gain,
    rate: DataRate,
    available: bool,
    error_count: u8,
    last_good: i16,
    last_recovery_attempt: Timestamp,
}

impl SensorHealthTracker {
    /// Wrap `device` as channel `id`. The tracker starts unavailable until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn new(
        id: u8,
        device: Box<dyn BusDevice>,
        gain: Gain,
        rate: DataRate,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let now = clock.now();
        Self {
            id,
            device,
            clock,
            gain,
            rate,
            available: false,
            error_count: 0,
            last_good: 0,
            last_recovery_attempt: now,
        }
    }

    /// Boot-time device init: probe, then up to three configure attempts.
    ///
    /// On failure the tracker stays unavailable and the recovery window
    /// starts now, so an optional device can come back on its own.
    pub fn initialize(&mut self) -> Result<(), SensorError> {
        let address = self.device.address();
        self.available = false;
        self.last_recovery_attempt = self.clock.now();

        if self.device.probe().is_err() {
            error!("channel {}: no device at 0x{:02X}", self.id, address);
            return Err(SensorError::NotFound { address });
        }

        let mut last_error = BusError::Bus;
        for attempt in 1..=INIT_CONFIGURE_ATTEMPTS {
            match self.device.configure(self.gain, self.rate) {
                Ok(()) => {
                    self.mark_available();
                    info!("channel {}: device 0x{:02X} initialised", self.id, address);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "channel {}: configure attempt {}/{} failed: {}",
                        self.id, attempt, INIT_CONFIGURE_ATTEMPTS, e
                    );
                    last_error = e;
                }
            }
        }

        error!("channel {}: device 0x{:02X} failed to initialise", self.id, address);
        Err(SensorError::InitFailed {
            address,
            source: last_error,
        })
    }

    /// Read the channel. Never fails and never blocks beyond one bus
    /// transaction (or one recovery attempt).
    pub fn read(&mut self) -> Reading {
        if !self.available {
            self.try_recover();
            return Reading::Stale(self.last_good);
        }

        match self.device.read_channel() {
            Ok(value) => {
                self.error_count = 0;
                self.last_good = value;
                Reading::Fresh(value)
            }
            Err(e) => {
                self.error_count = self.error_count.saturating_add(1);
                warn!(
                    "channel {}: read failed ({}), error count {}",
                    self.id, e, self.error_count
                );
                if self.error_count >= MAX_CONSECUTIVE_ERRORS {
                    self.available = false;
                    self.last_recovery_attempt = self.clock.now();
                    error!(
                        "channel {}: marked unavailable after {} consecutive failures",
                        self.id, self.error_count
                    );
                }
                Reading::Stale(self.last_good)
            }
        }
    }

    fn try_recover(&mut self) {
        if self.clock.elapsed_since(self.last_recovery_attempt) < RECOVERY_INTERVAL_MS {
            return;
        }
        self.last_recovery_attempt = self.clock.now();

        let recovered = self.device.probe().is_ok()
            && self.device.configure(self.gain, self.rate).is_ok();
        if recovered {
            self.mark_available();
            info!("channel {}: device recovered", self.id);
        } else {
            warn!("channel {}: recovery attempt failed", self.id);
        }
    }

    fn mark_available(&mut self) {
        self.available = true;
        self.error_count = 0;
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn last_good(&self) -> i16 {
        self.last_good
    }
}
