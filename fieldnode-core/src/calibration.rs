//! Zero-Offset Calibration
//!
//! ## Overview
//!
//! Each [`Channel`] pairs a tracker with a calibration offset. The
//! [`CalibrationEngine`] samples a channel with its input at rest and stores
//! the arithmetic mean of the raw values as the new offset; the acquisition
//! loop subtracts it from every subsequent reading.
//!
//! ## Sampling Rules
//!
//! - Only fresh values count. A stale read (failed bus transaction) retries
//!   the same slot after a short back-off instead of averaging in an old value.
//! - The tracker bounds the retries: after five consecutive failures it marks
//!   itself unavailable, which aborts the run and keeps the previous offset.
//! - A channel that is already unavailable is not calibrated.
//!
//! Offsets are kept in memory only; every boot calibrates again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::constants::{CALIBRATION_RETRY_DELAY_MS, CALIBRATION_SAMPLES, CALIBRATION_SAMPLE_DELAY_MS};
use crate::errors::CalibrationError;
use crate::sensor::{Reading, SensorHealthTracker};

/// One analog input path: its tracker and its zero-offset
pub struct Channel {
    id: u8,
    tracker: Mutex<SensorHealthTracker>,
    offset_bits: AtomicU32,
}

impl Channel {
    pub fn new(tracker: SensorHealthTracker) -> Self {
        Self {
            id: tracker.id(),
            tracker: Mutex::new(tracker),
            offset_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Current zero-offset in raw counts
    pub fn offset(&self) -> f32 {
        f32::from_bits(self.offset_bits.load(Ordering::Acquire))
    }

    pub fn set_offset(&self, offset: f32) {
        self.offset_bits.store(offset.to_bits(), Ordering::Release);
    }

    /// Read through the tracker
    pub async fn read(&self) -> Reading {
        self.tracker.lock().await.read()
    }

    /// Read through the tracker and subtract the offset
    pub async fn read_calibrated(&self) -> f32 {
        self.read().await.value() as f32 - self.offset()
    }

    pub async fn is_available(&self) -> bool {
        self.tracker.lock().await.is_available()
    }

    /// Exclusive access to the tracker, e.g. for boot-time init
    pub async fn tracker(&self) -> tokio::sync::MutexGuard<'_, SensorHealthTracker> {
        self.tracker.lock().await
    }
}

/// Mean of the raw samples
pub fn mean_offset(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: i64 = samples.iter().map(|&v| v as i64).sum();
    sum as f32 / samples.len() as f32
}

/// Offset-mean calibration procedure
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    samples: usize,
    sample_delay: Duration,
    retry_delay: Duration,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self {
            samples: CALIBRATION_SAMPLES,
            sample_delay: Duration::from_millis(CALIBRATION_SAMPLE_DELAY_MS),
            retry_delay: Duration::from_millis(CALIBRATION_RETRY_DELAY_MS),
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_delays(mut self, sample_delay: Duration, retry_delay: Duration) -> Self {
        self.sample_delay = sample_delay;
        self.retry_delay = retry_delay;
        self
    }

    /// Collect fresh samples and store their mean as the channel offset.
    ///
    /// Returns the new offset. On error the previous offset is untouched.
    pub async fn calibrate(&self, channel: &Channel) -> Result<f32, CalibrationError> {
        if !channel.is_available().await {
            warn!("channel {}: unavailable, calibration skipped", channel.id());
            return Err(CalibrationError::Unavailable {
                channel: channel.id(),
            });
        }

        let mut collected = Vec::with_capacity(self.samples);
        while collected.len() < self.samples {
            let (reading, available) = {
                let mut tracker = channel.tracker().await;
                let reading = tracker.read();
                (reading, tracker.is_available())
            };

            match reading {
                Reading::Fresh(value) => {
                    collected.push(value);
                    tokio::time::sleep(self.sample_delay).await;
                }
                Reading::Stale(_) if !available => {
                    warn!(
                        "channel {}: lost during calibration after {} samples",
                        channel.id(),
                        collected.len()
                    );
                    return Err(CalibrationError::SensorLost {
                        channel: channel.id(),
                        collected: collected.len(),
                    });
                }
                Reading::Stale(_) => tokio::time::sleep(self.retry_delay).await,
            }
        }

        let offset = mean_offset(&collected);
        channel.set_offset(offset);
        info!("channel {}: calibration offset {:.2}", channel.id(), offset);
        Ok(offset)
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_zero_to_fifteen() {
        let samples: Vec<i16> = (0..16).collect();
        assert_eq!(mean_offset(&samples), 7.5);
    }

    #[test]
    fn mean_does_not_overflow() {
        let samples = [i16::MAX; 16];
        assert_eq!(mean_offset(&samples), i16::MAX as f32);
    }
}
