//! Common fixtures for fieldnode-link integration tests
//!
//! Provides:
//! - A bus device whose reading the test sets directly
//! - A network stack double with a switchable link and scripted joins
//! - A [`Node`] builder wiring everything into a [`NodeContext`]

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use fieldnode_core::constants::DEFAULT_RELAY_PINS;
use fieldnode_core::{
    BusDevice, BusError, BusResult, CalibrationEngine, Channel, DataRate, Gain, KeyValueStore,
    ManualClock, MemoryStore, OutputDriver, OutputFault, RelayBank, SamplingPeriod,
    SensorHealthTracker, SharedTelemetryState,
};
use fieldnode_link::{
    LinkError, LinkInfo, LinkStatus, NetworkControl, NodeContext, Notification,
    RadioCommandDispatcher, ScanEntry, UpdateTransport,
};

/// Test-side control of a [`KnobDevice`]
#[derive(Clone, Debug)]
pub struct Knob {
    value: Arc<AtomicI32>,
    failing: Arc<AtomicBool>,
}

impl Knob {
    pub fn set(&self, value: i16) {
        self.value.store(value as i32, Ordering::SeqCst);
    }

    /// Make every bus transaction fail
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

/// Bus device returning whatever its knob is set to
pub struct KnobDevice {
    address: u8,
    knob: Knob,
}

impl KnobDevice {
    pub fn new(address: u8, value: i16) -> (Self, Knob) {
        let knob = Knob {
            value: Arc::new(AtomicI32::new(value as i32)),
            failing: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                address,
                knob: knob.clone(),
            },
            knob,
        )
    }

    fn check(&self) -> BusResult<()> {
        if self.knob.failing.load(Ordering::SeqCst) {
            Err(BusError::Nack {
                address: self.address,
            })
        } else {
            Ok(())
        }
    }
}

impl BusDevice for KnobDevice {
    fn address(&self) -> u8 {
        self.address
    }

    fn probe(&mut self) -> BusResult<()> {
        self.check()
    }

    fn configure(&mut self, _gain: Gain, _rate: DataRate) -> BusResult<()> {
        self.check()
    }

    fn read_channel(&mut self) -> BusResult<i16> {
        self.check()?;
        Ok(self.knob.value.load(Ordering::SeqCst) as i16)
    }
}

/// Relay output that can be made to fail
#[derive(Clone, Default)]
pub struct SwitchOutput {
    broken: Arc<AtomicBool>,
}

impl SwitchOutput {
    pub fn break_output(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl OutputDriver for SwitchOutput {
    fn drive(&mut self, _high: bool) -> Result<(), OutputFault> {
        if self.broken.load(Ordering::SeqCst) {
            Err(OutputFault)
        } else {
            Ok(())
        }
    }
}

/// How the fake network answers a join
#[derive(Clone, Debug)]
pub enum JoinScript {
    Succeed { rssi: i32 },
    Fail,
    Hang,
}

/// Network stack double
pub struct FakeNetwork {
    status: Mutex<LinkStatus>,
    scan: Mutex<Vec<ScanEntry>>,
    join: Mutex<JoinScript>,
    joins: Mutex<Vec<(String, String)>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(LinkStatus::Idle),
            scan: Mutex::new(Vec::new()),
            join: Mutex::new(JoinScript::Succeed { rssi: -55 }),
            joins: Mutex::new(Vec::new()),
        }
    }

    pub fn set_link(&self, up: bool) {
        *self.status.lock().unwrap() = if up {
            LinkStatus::Connected {
                ssid: "test-net".into(),
                rssi: -50,
            }
        } else {
            LinkStatus::Disconnected
        };
    }

    pub fn set_scan(&self, entries: &[(&str, i32)]) {
        *self.scan.lock().unwrap() = entries
            .iter()
            .map(|(ssid, rssi)| ScanEntry {
                ssid: (*ssid).to_owned(),
                rssi: *rssi,
            })
            .collect();
    }

    pub fn script_join(&self, script: JoinScript) {
        *self.join.lock().unwrap() = script;
    }

    /// Credentials of every join attempt, in order
    pub fn joins(&self) -> Vec<(String, String)> {
        self.joins.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkControl for FakeNetwork {
    async fn scan(&self) -> Result<Vec<ScanEntry>, LinkError> {
        Ok(self.scan.lock().unwrap().clone())
    }

    async fn connect(&self, ssid: &str, password: &str) -> Result<LinkInfo, LinkError> {
        self.joins
            .lock()
            .unwrap()
            .push((ssid.to_owned(), password.to_owned()));
        let script = self.join.lock().unwrap().clone();
        match script {
            JoinScript::Succeed { rssi } => {
                *self.status.lock().unwrap() = LinkStatus::Connected {
                    ssid: ssid.to_owned(),
                    rssi,
                };
                Ok(LinkInfo {
                    ssid: ssid.to_owned(),
                    rssi,
                })
            }
            JoinScript::Fail => {
                *self.status.lock().unwrap() = LinkStatus::ConnectionFailed;
                Err(LinkError::JoinFailed {
                    ssid: ssid.to_owned(),
                })
            }
            JoinScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LinkError::LinkDown)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        *self.status.lock().unwrap() = LinkStatus::Disconnected;
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.status.lock().unwrap().clone()
    }
}

/// Update transport that only records arming
#[derive(Default)]
pub struct FakeUpdates {
    armed: AtomicBool,
}

impl UpdateTransport for FakeUpdates {
    fn arm(&self) -> Result<(), LinkError> {
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// A fully wired node with test handles to every collaborator
pub struct Node {
    pub ctx: Arc<NodeContext>,
    pub primary: Knob,
    pub secondary: Knob,
    pub outputs: Vec<SwitchOutput>,
    pub network: Arc<FakeNetwork>,
    pub updates: Arc<FakeUpdates>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
}

fn channel(id: u8, address: u8, value: i16, clock: &ManualClock) -> (Arc<Channel>, Knob) {
    let (device, knob) = KnobDevice::new(address, value);
    let mut tracker = SensorHealthTracker::new(
        id,
        Box::new(device),
        Gain::Eight,
        DataRate::Sps860,
        Arc::new(clock.clone()),
    );
    if let Err(e) = tracker.initialize() {
        panic!("channel {id}: {e}");
    }
    (Arc::new(Channel::new(tracker)), knob)
}

/// Build a node whose channels read `primary` and `secondary` counts
pub fn node(primary: i16, secondary: i16) -> Node {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn KeyValueStore> = store.clone();

    let outputs: Vec<SwitchOutput> = (0..4).map(|_| SwitchOutput::default()).collect();
    let relays = match RelayBank::new(
        DEFAULT_RELAY_PINS,
        outputs
            .iter()
            .map(|o| Box::new(o.clone()) as Box<dyn OutputDriver>),
        dyn_store.clone(),
    ) {
        Ok(relays) => relays,
        Err(e) => panic!("relay bank: {e}"),
    };

    let (primary_channel, primary_knob) = channel(1, 0x48, primary, &clock);
    let (secondary_channel, secondary_knob) = channel(2, 0x49, secondary, &clock);

    let network = Arc::new(FakeNetwork::new());
    let updates = Arc::new(FakeUpdates::default());

    let ctx = Arc::new(NodeContext {
        device_name: "TestNode".into(),
        relay_pins: DEFAULT_RELAY_PINS,
        telemetry: SharedTelemetryState::new(relays),
        primary: primary_channel,
        secondary: secondary_channel,
        calibration: CalibrationEngine::new()
            .with_samples(4)
            .with_delays(Duration::from_millis(1), Duration::from_millis(5)),
        sampling: SamplingPeriod::new(dyn_store.clone()),
        store: dyn_store,
        network: network.clone(),
        updates: updates.clone(),
    });

    Node {
        ctx,
        primary: primary_knob,
        secondary: secondary_knob,
        outputs,
        network,
        updates,
        store,
        clock,
    }
}

/// Radio dispatcher for `node` and the receiving end of its notifications
pub fn radio(node: &Node) -> (Arc<RadioCommandDispatcher>, UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(RadioCommandDispatcher::new(
        node.ctx.clone(),
        tx,
        Arc::new(node.clock.clone()),
    ));
    (dispatcher, rx)
}

/// Everything queued on `rx` so far
pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
