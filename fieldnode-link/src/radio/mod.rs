//! Low-power radio link: command grammar, version handshake, dispatcher and
//! the periodic telemetry publisher.

pub mod command;
pub mod dispatcher;
pub mod telemetry;
pub mod version;

pub use command::RadioCommand;
pub use dispatcher::{Characteristic, Notification, RadioCommandDispatcher};
pub use telemetry::{PublishOutcome, TelemetryFrame, TelemetryPublisher};
pub use version::{check_protocol_version, ProtocolVersion};
