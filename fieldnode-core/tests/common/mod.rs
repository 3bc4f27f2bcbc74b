//! Common fixtures for fieldnode-core integration tests
//!
//! Provides:
//! - A scripted bus device whose behaviour the test drives through a handle
//! - Relay outputs and a key-value store that record every write
//! - Builders for channels and shared telemetry state

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use fieldnode_core::{
    constants::DEFAULT_RELAY_PINS, BusDevice, BusError, BusResult, Channel, DataRate, Gain,
    KeyValueStore, ManualClock, MemoryStore, OutputDriver, OutputFault, RelayBank,
    SensorHealthTracker, SharedTelemetryState, StoreError,
};

#[derive(Debug)]
struct DeviceScript {
    queued: VecDeque<BusResult<i16>>,
    fallback: BusResult<i16>,
    present: bool,
    reads: usize,
}

/// Test-side control of a [`ScriptedDevice`]
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    script: Arc<Mutex<DeviceScript>>,
}

impl DeviceHandle {
    /// Queue results returned by the next reads, in order
    pub fn queue(&self, results: impl IntoIterator<Item = BusResult<i16>>) {
        self.script.lock().unwrap().queued.extend(results);
    }

    /// Result returned once the queue is empty
    pub fn set_fallback(&self, result: BusResult<i16>) {
        self.script.lock().unwrap().fallback = result;
    }

    /// Make probe and configure succeed or fail
    pub fn set_present(&self, present: bool) {
        self.script.lock().unwrap().present = present;
    }

    /// Bus reads performed so far
    pub fn reads(&self) -> usize {
        self.script.lock().unwrap().reads
    }
}

/// Bus device replaying scripted results
pub struct ScriptedDevice {
    address: u8,
    script: Arc<Mutex<DeviceScript>>,
}

impl ScriptedDevice {
    pub fn new(address: u8, fallback: i16) -> (Self, DeviceHandle) {
        let script = Arc::new(Mutex::new(DeviceScript {
            queued: VecDeque::new(),
            fallback: Ok(fallback),
            present: true,
            reads: 0,
        }));
        (
            Self {
                address,
                script: script.clone(),
            },
            DeviceHandle { script },
        )
    }
}

impl BusDevice for ScriptedDevice {
    fn address(&self) -> u8 {
        self.address
    }

    fn probe(&mut self) -> BusResult<()> {
        if self.script.lock().unwrap().present {
            Ok(())
        } else {
            Err(BusError::Nack {
                address: self.address,
            })
        }
    }

    fn configure(&mut self, _gain: Gain, _rate: DataRate) -> BusResult<()> {
        self.probe()
    }

    fn read_channel(&mut self) -> BusResult<i16> {
        let mut script = self.script.lock().unwrap();
        script.reads += 1;
        let fallback = script.fallback;
        script.queued.pop_front().unwrap_or(fallback)
    }
}

/// Channel around a scripted device, initialised when `present`
pub fn channel(id: u8, address: u8, fallback: i16, present: bool) -> (Arc<Channel>, DeviceHandle, ManualClock) {
    let clock = ManualClock::new(0);
    let (device, handle) = ScriptedDevice::new(address, fallback);
    handle.set_present(present);
    let mut tracker = SensorHealthTracker::new(
        id,
        Box::new(device),
        Gain::Eight,
        DataRate::Sps860,
        Arc::new(clock.clone()),
    );
    let _ = tracker.initialize();
    (Arc::new(Channel::new(tracker)), handle, clock)
}

/// Relay output that always succeeds
pub struct NullOutput;

impl OutputDriver for NullOutput {
    fn drive(&mut self, _high: bool) -> Result<(), OutputFault> {
        Ok(())
    }
}

/// Store that keeps every write in order
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    fn record(&self, key: &str, value: String) {
        self.writes.lock().unwrap().push((key.to_owned(), value));
    }
}

impl KeyValueStore for RecordingStore {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        self.inner.get_bool(key)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.record(key, value.to_string());
        self.inner.put_bool(key, value)
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StoreError> {
        self.inner.get_u32(key)
    }

    fn put_u32(&self, key: &str, value: u32) -> Result<(), StoreError> {
        self.record(key, value.to_string());
        self.inner.put_u32(key, value)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_string(key)
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.record(key, value.to_owned());
        self.inner.put_string(key, value)
    }
}

/// Telemetry state with four always-working relays
pub fn telemetry(store: Arc<dyn KeyValueStore>) -> SharedTelemetryState {
    let outputs = (0..4).map(|_| Box::new(NullOutput) as Box<dyn OutputDriver>);
    let relays = match RelayBank::new(DEFAULT_RELAY_PINS, outputs, store) {
        Ok(relays) => relays,
        Err(e) => panic!("relay bank: {e}"),
    };
    SharedTelemetryState::new(relays)
}
