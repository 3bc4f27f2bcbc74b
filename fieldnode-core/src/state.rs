//! Shared Telemetry State
//!
//! ## Overview
//!
//! The ring buffers and the relay bank are the only state written from more
//! than one task: the acquisition loop writes samples, both dispatchers write
//! relay states. They live together behind one [`TimedMutex`] so a reader
//! always sees both channels of a tick, never one without the other.
//!
//! ## Lock Discipline
//!
//! Every access waits at most [`TELEMETRY_LOCK_WAIT_MS`]. A caller that does
//! not get the lock in time skips its operation and reports it; nobody
//! retries in a loop and nobody waits indefinitely.
//!
//! ```text
//!   acquisition ──┐
//!   radio ────────┼──▶ try_lock_for(10 ms) ──▶ Some(guard) → operate
//!   socket rpc ───┘                        └─▶ None        → skip + log
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::buffer::{SampleRing, Slot};
use crate::constants::{AVG_WINDOW, RELAY_COUNT, TELEMETRY_LOCK_WAIT_MS};
use crate::errors::StateError;
use crate::relay::{RelayBank, RelayChange};

/// Mutex whose only acquisition path is a bounded wait
#[derive(Debug, Default)]
pub struct TimedMutex<T> {
    inner: Mutex<T>,
}

impl<T> TimedMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, giving up after `wait`
    pub async fn try_lock_for(&self, wait: Duration) -> Option<TimedGuard<'_, T>> {
        tokio::time::timeout(wait, self.inner.lock())
            .await
            .ok()
            .map(|guard| TimedGuard { guard })
    }
}

/// Guard returned by [`TimedMutex::try_lock_for`]
pub struct TimedGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for TimedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for TimedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Everything guarded by the telemetry lock
pub struct Telemetry {
    pub samples: SampleRing<AVG_WINDOW>,
    pub relays: RelayBank,
}

/// Point-in-time copy of the averaged telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    /// Moving average of channel 1 (calibrated counts)
    pub primary_avg: f32,
    /// Moving average of channel 2 (calibrated counts)
    pub secondary_avg: f32,
    pub relay_pins: [u8; RELAY_COUNT],
    pub relay_states: [bool; RELAY_COUNT],
}

/// Cloneable handle to the shared telemetry state
#[derive(Clone)]
pub struct SharedTelemetryState {
    inner: Arc<TimedMutex<Telemetry>>,
    wait: Duration,
}

impl SharedTelemetryState {
    pub fn new(relays: RelayBank) -> Self {
        Self {
            inner: Arc::new(TimedMutex::new(Telemetry {
                samples: SampleRing::new(),
                relays,
            })),
            wait: Duration::from_millis(TELEMETRY_LOCK_WAIT_MS),
        }
    }

    /// Bounded wait applied by every accessor
    pub fn lock_wait(&self) -> Duration {
        self.wait
    }

    /// Raw lock access with the standard bounded wait
    pub async fn try_lock(&self) -> Option<TimedGuard<'_, Telemetry>> {
        self.inner.try_lock_for(self.wait).await
    }

    fn busy(&self) -> StateError {
        StateError::LockTimeout {
            waited_ms: self.wait.as_millis() as u64,
        }
    }

    /// Averages and relay states under one lock acquisition
    pub async fn snapshot(&self) -> Result<TelemetrySnapshot, StateError> {
        let guard = self.try_lock().await.ok_or_else(|| self.busy())?;
        Ok(TelemetrySnapshot {
            primary_avg: guard.samples.average(Slot::Primary),
            secondary_avg: guard.samples.average(Slot::Secondary),
            relay_pins: guard.relays.pins(),
            relay_states: guard.relays.states(),
        })
    }

    pub async fn relay_states(&self) -> Result<[bool; RELAY_COUNT], StateError> {
        let guard = self.try_lock().await.ok_or_else(|| self.busy())?;
        Ok(guard.relays.states())
    }

    pub async fn set_relay_pin(&self, pin: u8, on: bool) -> Result<RelayChange, StateError> {
        let mut guard = self.try_lock().await.ok_or_else(|| self.busy())?;
        Ok(guard.relays.set_pin(pin, on)?)
    }

    pub async fn toggle_relay_pin(&self, pin: u8) -> Result<RelayChange, StateError> {
        let mut guard = self.try_lock().await.ok_or_else(|| self.busy())?;
        Ok(guard.relays.toggle_pin(pin)?)
    }

    pub async fn set_relay_index(&self, index: usize, on: bool) -> Result<RelayChange, StateError> {
        let mut guard = self.try_lock().await.ok_or_else(|| self.busy())?;
        Ok(guard.relays.set_index(index, on)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn try_lock_for_times_out_while_held() {
        let mutex = Arc::new(TimedMutex::new(0u32));
        let held = mutex.try_lock_for(Duration::from_millis(10)).await.unwrap();

        assert!(mutex.try_lock_for(Duration::from_millis(10)).await.is_none());
        drop(held);

        let mut guard = mutex.try_lock_for(Duration::from_millis(10)).await.unwrap();
        *guard += 1;
        assert_eq!(*guard, 1);
    }
}
