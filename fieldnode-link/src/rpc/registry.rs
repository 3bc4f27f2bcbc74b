//! Resource and Tool Registry
//!
//! ## Overview
//!
//! The socket server exposes a closed set of read-only resources and
//! invokable tools. Both are tagged variants stored in fixed-capacity tables,
//! built once when the server is first set up and never modified afterwards.
//! Lookups are linear scans; the tables hold at most 10 and 8 entries.
//!
//! ## Resources
//!
//! | URI                        | Type    | Value                          |
//! |----------------------------|---------|--------------------------------|
//! | `adc.shunt_diff`           | number  | channel 1 average, 2 decimals  |
//! | `adc.ads2_a0`              | number  | channel 2 average or `unavailable` |
//! | `relay.0` .. `relay.3`     | boolean | `on` / `off`                   |
//! | `wifi.status`              | string  | link status                    |
//! | `config.sampling_interval` | number  | period in ms                   |
//!
//! ## Tools
//!
//! Every tool returns `{"success": bool, "message": string}`.

use std::sync::Arc;

use heapless::Vec;
use log::info;
use serde::Serialize;
use serde_json::{Map, Value};

use fieldnode_core::constants::RELAY_COUNT;
use fieldnode_core::{RelayError, StateError};

use crate::context::NodeContext;
use crate::error::RpcError;

/// Capacity of the resource table
pub const MAX_RESOURCES: usize = 10;

/// Capacity of the tool table
pub const MAX_TOOLS: usize = 8;

/// What a resource reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ShuntDiff,
    Ads2A0,
    Relay(usize),
    WifiStatus,
    SamplingInterval,
}

/// A named read-only value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub uri: &'static str,
    pub type_tag: &'static str,
    pub kind: ResourceKind,
}

impl Resource {
    /// Current value rendered as a string
    pub async fn read(&self, ctx: &NodeContext) -> Result<String, RpcError> {
        match self.kind {
            ResourceKind::ShuntDiff => {
                let snapshot = ctx.telemetry.snapshot().await.map_err(|_| RpcError::busy())?;
                Ok(format!("{:.2}", snapshot.primary_avg))
            }
            ResourceKind::Ads2A0 => {
                if !ctx.secondary.is_available().await {
                    return Ok("unavailable".to_owned());
                }
                let snapshot = ctx.telemetry.snapshot().await.map_err(|_| RpcError::busy())?;
                Ok(format!("{:.2}", snapshot.secondary_avg))
            }
            ResourceKind::Relay(index) => {
                let states = ctx.telemetry.relay_states().await.map_err(|_| RpcError::busy())?;
                let on = states.get(index).copied().unwrap_or(false);
                Ok(if on { "on" } else { "off" }.to_owned())
            }
            ResourceKind::WifiStatus => Ok(ctx.network.status().as_str().to_owned()),
            ResourceKind::SamplingInterval => Ok(ctx.sampling.millis().to_string()),
        }
    }
}

/// What a tool does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    RelaySet,
    WifiScan,
    WifiConnect,
    AdcCalibrate,
    SetSamplingInterval,
    ClientRegister,
    StdioPrint,
}

/// Result object of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
}

impl ToolResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A named invokable action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub uri: &'static str,
    pub kind: ToolKind,
}

impl Tool {
    pub async fn execute(&self, ctx: &Arc<NodeContext>, params: &Map<String, Value>) -> ToolResult {
        match self.kind {
            ToolKind::RelaySet => {
                let index = params.get("index").and_then(Value::as_u64);
                let state = params.get("state").and_then(Value::as_bool);
                let (Some(index), Some(state)) = (index, state) else {
                    return ToolResult::failed("Missing parameters");
                };
                match ctx.telemetry.set_relay_index(index as usize, state).await {
                    Ok(_) => ToolResult::ok(format!(
                        "Relay {} set to {}",
                        index,
                        if state { "ON" } else { "OFF" }
                    )),
                    Err(StateError::LockTimeout { .. }) => ToolResult::failed("Telemetry busy"),
                    Err(StateError::Relay(RelayError::Output { pin })) => {
                        ToolResult::failed(format!("Relay pin {} could not be driven", pin))
                    }
                    Err(StateError::Relay(_)) => ToolResult::failed("Invalid relay index"),
                }
            }
            ToolKind::WifiScan => match ctx.network.scan().await {
                Ok(networks) if networks.is_empty() => ToolResult::ok("No networks found"),
                Ok(networks) => ToolResult::ok(
                    networks
                        .iter()
                        .map(|n| format!("{}({})", n.ssid, n.rssi))
                        .collect::<std::vec::Vec<_>>()
                        .join(","),
                ),
                Err(e) => ToolResult::failed(e.to_string()),
            },
            ToolKind::WifiConnect => {
                let ssid = params.get("ssid").and_then(Value::as_str);
                let password = params.get("password").and_then(Value::as_str);
                let (Some(ssid), Some(password)) = (ssid, password) else {
                    return ToolResult::failed("Missing SSID or password");
                };
                // The join blocks for up to 10 s; do not hold the session for it
                let (ssid, password) = (ssid.to_owned(), password.to_owned());
                let message = format!("Connecting to WiFi: {}", ssid);
                let ctx = Arc::clone(ctx);
                tokio::spawn(async move {
                    let _ = ctx.join_network(&ssid, &password).await;
                });
                ToolResult::ok(message)
            }
            ToolKind::AdcCalibrate => {
                match ctx.calibrate_reporting().await {
                    None => ToolResult::ok("ADC calibration completed"),
                    Some(failed) => ToolResult::failed(format!(
                        "ADC calibration failed on channel {}",
                        failed
                    )),
                }
            }
            ToolKind::SetSamplingInterval => {
                let Some(interval) = params.get("interval").filter(|v| v.is_number()) else {
                    return ToolResult::failed("Missing interval parameter");
                };
                // Negative and fractional values are out of range, not missing
                let applied = interval
                    .as_u64()
                    .map(|ms| u32::try_from(ms).unwrap_or(u32::MAX))
                    .and_then(|ms| ctx.sampling.set(ms).ok());
                match applied {
                    Some(ms) => ToolResult::ok(format!("Sampling interval set to {}ms", ms)),
                    None => ToolResult::failed("Interval must be between 5ms and 1000ms"),
                }
            }
            ToolKind::ClientRegister => {
                info!("rpc client registered");
                ToolResult::ok("Client registered successfully")
            }
            ToolKind::StdioPrint => match params.get("message").and_then(Value::as_str) {
                Some(message) => {
                    info!("rpc print: {}", message);
                    ToolResult::ok("Message printed to log")
                }
                None => ToolResult::failed("Missing message parameter"),
            },
        }
    }
}

const RELAY_URIS: [&str; RELAY_COUNT] = ["relay.0", "relay.1", "relay.2", "relay.3"];

/// Immutable resource and tool tables
#[derive(Debug, Clone)]
pub struct Registry {
    resources: Vec<Resource, MAX_RESOURCES>,
    tools: Vec<Tool, MAX_TOOLS>,
}

impl Registry {
    /// The node's fixed resource and tool set
    pub fn standard() -> Self {
        let mut resources: Vec<Resource, MAX_RESOURCES> = Vec::new();
        let mut tools: Vec<Tool, MAX_TOOLS> = Vec::new();

        let relays = RELAY_URIS.into_iter().enumerate().map(|(index, uri)| Resource {
            uri,
            type_tag: "boolean",
            kind: ResourceKind::Relay(index),
        });
        let entries = [
            Resource { uri: "adc.shunt_diff", type_tag: "number", kind: ResourceKind::ShuntDiff },
            Resource { uri: "adc.ads2_a0", type_tag: "number", kind: ResourceKind::Ads2A0 },
        ]
        .into_iter()
        .chain(relays)
        .chain([
            Resource { uri: "wifi.status", type_tag: "string", kind: ResourceKind::WifiStatus },
            Resource {
                uri: "config.sampling_interval",
                type_tag: "number",
                kind: ResourceKind::SamplingInterval,
            },
        ]);
        for entry in entries {
            // Fixed set, always within capacity
            let _ = resources.push(entry);
        }

        for (uri, kind) in [
            ("relay.set", ToolKind::RelaySet),
            ("wifi.scan", ToolKind::WifiScan),
            ("wifi.connect", ToolKind::WifiConnect),
            ("adc.calibrate", ToolKind::AdcCalibrate),
            ("config.set_sampling_interval", ToolKind::SetSamplingInterval),
            ("client.register", ToolKind::ClientRegister),
            ("stdio.print", ToolKind::StdioPrint),
        ] {
            let _ = tools.push(Tool { uri, kind });
        }

        info!(
            "registered {} resources and {} tools",
            resources.len(),
            tools.len()
        );
        Self { resources, tools }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn resource(&self, uri: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.uri == uri)
    }

    pub fn tool(&self, uri: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.uri == uri)
    }
}
