//! Radio telemetry frames
//!
//! Every 100 ms, while a radio client is connected, the publisher averages
//! both sample rings and sends one JSON frame on the data channel:
//!
//! ```text
//! {"protocol_version":"1.2.0","timestamp":123456,
//!  "measurements":{"shunt_diff":-12.4,"ads2_a0":0.0},
//!  "relays":{"relay1":1,"relay2":0,"relay3":0,"relay4":0}}
//! ```
//!
//! Averages whose magnitude is below the deadband are sent as exactly zero.
//! Channel 2 is reported as zero while it is unavailable.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use fieldnode_core::constants::{
    MAX_TELEMETRY_FRAME_BYTES, NOTIFICATION_INTERVAL_MS, PROTOCOL_VERSION, TELEMETRY_DEADBAND,
};
use fieldnode_core::{TelemetrySnapshot, TimeSource, Timestamp};

use crate::radio::dispatcher::RadioCommandDispatcher;

/// Clamp values inside the deadband to zero
pub fn apply_deadband(value: f32) -> f32 {
    if value.abs() < TELEMETRY_DEADBAND {
        0.0
    } else {
        value
    }
}

#[derive(Debug, Serialize)]
pub struct Measurements {
    pub shunt_diff: f32,
    pub ads2_a0: f32,
}

#[derive(Debug, Serialize)]
pub struct RelayFlags {
    pub relay1: u8,
    pub relay2: u8,
    pub relay3: u8,
    pub relay4: u8,
}

/// One telemetry notification
#[derive(Debug, Serialize)]
pub struct TelemetryFrame {
    pub protocol_version: &'static str,
    pub timestamp: Timestamp,
    pub measurements: Measurements,
    pub relays: RelayFlags,
}

impl TelemetryFrame {
    /// Build a frame from a snapshot; `secondary_available` gates channel 2
    pub fn from_snapshot(
        snapshot: &TelemetrySnapshot,
        secondary_available: bool,
        timestamp: Timestamp,
    ) -> Self {
        let secondary = if secondary_available {
            snapshot.secondary_avg
        } else {
            0.0
        };
        let [r1, r2, r3, r4] = snapshot.relay_states.map(u8::from);
        Self {
            protocol_version: PROTOCOL_VERSION,
            timestamp,
            measurements: Measurements {
                shunt_diff: apply_deadband(snapshot.primary_avg),
                ads2_a0: apply_deadband(secondary),
            },
            relays: RelayFlags {
                relay1: r1,
                relay2: r2,
                relay3: r3,
                relay4: r4,
            },
        }
    }
}

/// What one publish attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    NotConnected,
    RateLimited,
    Busy,
    Dropped,
}

/// Periodic telemetry publisher for the radio data channel
pub struct TelemetryPublisher {
    dispatcher: Arc<RadioCommandDispatcher>,
    clock: Arc<dyn TimeSource>,
}

impl TelemetryPublisher {
    pub fn new(dispatcher: Arc<RadioCommandDispatcher>, clock: Arc<dyn TimeSource>) -> Self {
        Self { dispatcher, clock }
    }

    pub async fn publish_once(&self) -> PublishOutcome {
        if !self.dispatcher.is_connected() {
            return PublishOutcome::NotConnected;
        }

        let ctx = self.dispatcher.context();
        let snapshot = match ctx.telemetry.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("telemetry: {}", e);
                return PublishOutcome::Busy;
            }
        };
        let secondary_available = ctx.secondary.is_available().await;
        let frame = TelemetryFrame::from_snapshot(&snapshot, secondary_available, self.clock.now());

        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                error!("telemetry: could not encode frame: {}", e);
                return PublishOutcome::Dropped;
            }
        };
        if payload.is_empty() || payload.len() >= MAX_TELEMETRY_FRAME_BYTES {
            error!("telemetry: frame of {} bytes dropped", payload.len());
            return PublishOutcome::Dropped;
        }

        debug!("telemetry: {}", payload);
        if self.dispatcher.notify_data(payload) {
            PublishOutcome::Sent
        } else {
            PublishOutcome::RateLimited
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(NOTIFICATION_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.publish_once().await;
        }
    }
}
