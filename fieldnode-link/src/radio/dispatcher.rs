//! Radio Command Dispatcher
//!
//! ## Overview
//!
//! The radio link exposes three characteristics:
//!
//! ```text
//! ┌────────┬─────────────┬──────────────────────────────────────────┐
//! │ Data   │ notify      │ connect announcement, telemetry frames   │
//! │ Relay  │ write/notify│ relay, config, calibration, OTA commands │
//! │ Wifi   │ write/notify│ scan, select, disconnect                 │
//! └────────┴─────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Each write is validated and parsed into a [`RadioCommand`] before anything
//! executes. Validation errors go back on the characteristic the write
//! arrived on; results go on the channel that owns the command.
//!
//! Notifications leave through an unbounded channel; the radio driver (or
//! the console in the host build) drains it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use fieldnode_core::constants::{
    NOTIFICATION_INTERVAL_MS, NOTIFICATION_JITTER_MS, PROTOCOL_VERSION,
};
use fieldnode_core::{RelayError, StateError, TimeSource, Timestamp};

use crate::context::NodeContext;
use crate::error::CommandError;
use crate::radio::command::RadioCommand;
use crate::radio::version::check_protocol_version;

/// Radio characteristic a notification is sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    Data,
    Relay,
    Wifi,
}

/// One outgoing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Characteristic,
    pub payload: String,
}

#[derive(Serialize)]
struct Announcement<'a> {
    protocol_version: &'a str,
    device_name: &'a str,
}

/// Validator and executor for radio commands
pub struct RadioCommandDispatcher {
    ctx: Arc<NodeContext>,
    outbox: UnboundedSender<Notification>,
    clock: Arc<dyn TimeSource>,
    connected: AtomicBool,
    rejected: AtomicBool,
    last_data_notification: Mutex<Option<Timestamp>>,
}

impl RadioCommandDispatcher {
    pub fn new(
        ctx: Arc<NodeContext>,
        outbox: UnboundedSender<Notification>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            ctx,
            outbox,
            clock,
            connected: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
            last_data_notification: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// A client connected: announce the protocol version on the data channel
    pub fn on_connect(&self) {
        self.connected.store(true, Ordering::Release);
        self.rejected.store(false, Ordering::Release);
        info!("radio client connected");

        let announcement = Announcement {
            protocol_version: PROTOCOL_VERSION,
            device_name: &self.ctx.device_name,
        };
        match serde_json::to_string(&announcement) {
            Ok(payload) => self.send(Characteristic::Data, payload),
            Err(e) => error!("could not encode announcement: {}", e),
        }
    }

    pub fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.rejected.store(false, Ordering::Release);
        info!("radio client disconnected");
    }

    /// Version handshake. A rejected client has its commands refused until
    /// it reconnects.
    pub fn handshake(&self, client_version: &str) -> Result<(), CommandError> {
        match check_protocol_version(client_version) {
            Ok(()) => {
                info!("radio client protocol {} accepted", client_version.trim());
                Ok(())
            }
            Err(e) => {
                warn!("radio client protocol {} rejected: {}", client_version.trim(), e);
                self.rejected.store(true, Ordering::Release);
                self.send(Characteristic::Relay, e.wire());
                Err(e)
            }
        }
    }

    /// Handle one write on `characteristic`
    pub async fn handle_write(&self, characteristic: Characteristic, raw: &str) -> Result<(), CommandError> {
        info!("radio command on {:?}: {}", characteristic, raw.trim());

        if self.rejected.load(Ordering::Acquire) {
            let e = CommandError::IncompatibleVersion("Handshake rejected");
            self.send(characteristic, e.wire());
            return Err(e);
        }

        let command = match RadioCommand::parse(raw, &self.ctx.relay_pins) {
            Ok(command) => command,
            Err(e) => {
                warn!("radio command rejected: {}", e.wire());
                self.send(characteristic, e.wire());
                return Err(e);
            }
        };

        if let Err(e) = self.execute(command).await {
            warn!("radio command failed: {}", e.wire());
            self.send(characteristic, e.wire());
            return Err(e);
        }
        Ok(())
    }

    /// Run a validated command
    pub async fn execute(&self, command: RadioCommand) -> Result<(), CommandError> {
        match command {
            RadioCommand::Calibrate => {
                info!("calibration started");
                if let Some(failed) = self.ctx.calibrate_reporting().await {
                    return Err(CommandError::CalibrationFailed(failed));
                }
                self.send(Characteristic::Relay, "LOG:Calibration complete".into());
            }
            RadioCommand::Ota => {
                if let Err(e) = self.ctx.updates.arm() {
                    warn!("{}", e);
                }
                self.send(Characteristic::Relay, "OTA:START".into());
            }
            RadioCommand::Toggle { pin } => {
                let change = self
                    .ctx
                    .telemetry
                    .toggle_relay_pin(pin)
                    .await
                    .map_err(relay_error)?;
                self.announce_relay(pin, change.on, "toggled to");
            }
            RadioCommand::Set { pin, on } => {
                let change = self
                    .ctx
                    .telemetry
                    .set_relay_pin(pin, on)
                    .await
                    .map_err(relay_error)?;
                self.announce_relay(pin, change.on, "set to");
            }
            RadioCommand::SetSamplingRate { ms } => {
                let ms = self
                    .ctx
                    .sampling
                    .set(ms as u32)
                    .map_err(|_| CommandError::InvalidSamplingRate)?;
                self.send(Characteristic::Relay, format!("SAMPLING_RATE:{}", ms));
            }
            RadioCommand::Scan => {
                let payload = match self.ctx.network.scan().await {
                    Ok(networks) if networks.is_empty() => "No networks found".to_owned(),
                    Ok(networks) => networks
                        .iter()
                        .map(|n| format!("{}({})", n.ssid, n.rssi))
                        .collect::<Vec<_>>()
                        .join(","),
                    Err(e) => {
                        warn!("{}", e);
                        "No networks found".to_owned()
                    }
                };
                self.send(Characteristic::Wifi, payload);
            }
            RadioCommand::Select { ssid, password } => {
                match self.ctx.join_network(&ssid, &password).await {
                    Ok(link) => self.send(
                        Characteristic::Wifi,
                        format!("WIFI_STATUS:CONNECTED:{}:{}", link.ssid, link.rssi),
                    ),
                    Err(e) => {
                        warn!("{}", e);
                        self.send(Characteristic::Wifi, format!("ERROR:WIFI:CONNECT_FAIL:{}", ssid));
                        self.send(Characteristic::Wifi, format!("WIFI_STATUS:FAILED:{}", ssid));
                    }
                }
            }
            RadioCommand::Disconnect => {
                if let Err(e) = self.ctx.network.disconnect().await {
                    warn!("{}", e);
                }
                self.send(Characteristic::Wifi, "WIFI_STATUS:DISCONNECTED".into());
            }
        }
        Ok(())
    }

    /// Send a telemetry frame on the data channel, at most once per
    /// notification interval and only while a client is connected.
    ///
    /// Returns whether the frame was sent.
    pub fn notify_data(&self, payload: String) -> bool {
        if !self.is_connected() {
            return false;
        }
        let now = self.clock.now();
        let Ok(mut last) = self.last_data_notification.lock() else {
            return false;
        };
        if let Some(previous) = *last {
            if now.saturating_sub(previous) + NOTIFICATION_JITTER_MS < NOTIFICATION_INTERVAL_MS {
                return false;
            }
        }
        *last = Some(now);
        drop(last);

        self.send(Characteristic::Data, payload);
        true
    }

    /// Emit a line on the relay channel, e.g. a boot failure
    pub fn notify_relay(&self, payload: String) {
        self.send(Characteristic::Relay, payload);
    }

    fn announce_relay(&self, pin: u8, on: bool, verb: &str) {
        let state = on_off(on);
        info!("relay {} {} {}", pin, verb, state);
        self.send(Characteristic::Relay, format!("LOG:Relay {} {} {}", pin, verb, state));
        self.send(Characteristic::Relay, format!("RELAY_UPDATE:{}:{}", pin, state));
    }

    fn send(&self, characteristic: Characteristic, payload: String) {
        if self
            .outbox
            .send(Notification {
                characteristic,
                payload,
            })
            .is_err()
        {
            warn!("radio outbox closed, notification dropped");
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

fn relay_error(e: StateError) -> CommandError {
    match e {
        StateError::LockTimeout { .. } => CommandError::Busy,
        StateError::Relay(RelayError::Output { pin }) => CommandError::RelayFault { pin },
        StateError::Relay(RelayError::UnknownPin { pin }) => CommandError::InvalidPin(pin.to_string()),
        StateError::Relay(RelayError::UnknownIndex { index }) => {
            CommandError::InvalidPin(index.to_string())
        }
    }
}
