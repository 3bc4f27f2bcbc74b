//! Client-facing links of a FieldNode
//!
//! ## Overview
//!
//! A node talks to the outside world over two independent transports that
//! share the same telemetry state:
//!
//! ```text
//!                      ┌───────────────────────┐
//!   radio client ─────►│ RadioCommandDispatcher│──┐
//!                      └───────────────────────┘  │   ┌───────────────────────┐
//!                                                 ├──►│ SharedTelemetryState  │
//!                      ┌───────────────────────┐  │   └───────────────────────┘
//!   socket client ────►│ RpcDispatcher         │──┘
//!                      └───────────────────────┘
//!                                ▲ start / stop
//!                      ┌─────────┴─────────────┐
//!                      │ LifecycleCoordinator  │◄── network link state
//!                      └───────────────────────┘
//! ```
//!
//! ### Radio
//!
//! **When used:** commissioning and local control from a phone.
//!
//! - Text commands on two write channels (relay/config, network)
//! - Telemetry frames every 100 ms on the data channel
//! - Protocol version handshake; major mismatch refuses the session
//!
//! ### Socket RPC
//!
//! **When used:** dashboards and scripts on the local network.
//!
//! - Line-delimited JSON over TCP
//! - Fixed resource and tool registry
//! - Change subscriptions polled every 200 ms
//!
//! ## Design Rationale
//!
//! Both dispatchers receive an explicit [`NodeContext`] at construction
//! instead of reaching for globals. Every lock they take is a bounded wait;
//! a busy lock turns into a structured error for the caller, never a stall.
//!
//! The network stack and the firmware-update transport are collaborators
//! behind [`NetworkControl`] and [`UpdateTransport`], supplied by the binary.

#![deny(unsafe_code)]

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod radio;
pub mod rpc;

pub use context::NodeContext;
pub use error::{CommandError, LinkError, RpcError};
pub use lifecycle::{LifecycleCoordinator, LifecycleStep};
pub use network::{
    join_network, LinkInfo, LinkStatus, LinkSupervisor, NetworkControl, ScanEntry,
    SupervisorAction, UpdateTransport,
};
pub use radio::{
    Characteristic, Notification, PublishOutcome, RadioCommand, RadioCommandDispatcher,
    TelemetryFrame, TelemetryPublisher,
};
pub use rpc::{ClientId, Registry, RpcDispatcher, RpcServer, RunningServer, SubscriptionTable};
