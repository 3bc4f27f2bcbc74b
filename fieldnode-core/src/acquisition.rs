//! Periodic Acquisition
//!
//! ## Overview
//!
//! The acquisition loop is the only writer of the sample rings. Once per
//! sampling period it:
//!
//! 1. reads channel 1 and subtracts its offset (outside the lock)
//! 2. takes the telemetry lock with a 10 ms bounded wait
//! 3. reads channel 2, subtracts its offset and pushes both values at the
//!    shared cursor before releasing the lock
//!
//! Channel 2 is read under the lock so both halves of a tick become visible
//! to readers together. A tick that misses the lock is skipped and counted;
//! its slots keep whatever the previous tick left there.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::calibration::Channel;
use crate::config::SamplingPeriod;
use crate::state::SharedTelemetryState;

/// Outcome of one acquisition tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Both calibrated values were written
    Written { primary: f32, secondary: f32 },
    /// Telemetry lock not acquired in time; nothing written
    Skipped,
}

/// Tick counters for diagnostics
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl AcquisitionStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Periodic two-channel sampler
pub struct AcquisitionLoop {
    primary: Arc<Channel>,
    secondary: Arc<Channel>,
    state: SharedTelemetryState,
    period: SamplingPeriod,
    stats: Arc<AcquisitionStats>,
}

impl AcquisitionLoop {
    pub fn new(
        primary: Arc<Channel>,
        secondary: Arc<Channel>,
        state: SharedTelemetryState,
        period: SamplingPeriod,
    ) -> Self {
        Self {
            primary,
            secondary,
            state,
            period,
            stats: Arc::new(AcquisitionStats::default()),
        }
    }

    /// Shared handle to the tick counters
    pub fn stats(&self) -> Arc<AcquisitionStats> {
        self.stats.clone()
    }

    /// Run one tick
    pub async fn tick(&self) -> TickOutcome {
        let primary = self.primary.read_calibrated().await;

        let Some(mut telemetry) = self.state.try_lock().await else {
            let skipped = self.stats.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("acquisition: telemetry lock busy, tick skipped ({} total)", skipped);
            return TickOutcome::Skipped;
        };

        let secondary = self.secondary.read_calibrated().await;
        telemetry.samples.push_pair(primary, secondary);
        drop(telemetry);

        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        debug!("acquisition: {:.2} / {:.2}", primary, secondary);
        TickOutcome::Written { primary, secondary }
    }

    /// Tick forever, re-reading the period every cycle
    pub async fn run(self) {
        loop {
            self.tick().await;
            tokio::time::sleep(self.period.get()).await;
        }
    }
}
