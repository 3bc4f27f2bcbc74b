//! Link-layer errors
//!
//! Every error here is delivered to a client as a structured message and
//! never tears down the transport it arrived on.

use thiserror::Error;

/// Radio command rejection
///
/// `Display` renders the human-readable detail; [`wire`](Self::wire) renders
/// the full `ERROR:<CODE>:<detail>` notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidPin(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Value must be between 5-1000")]
    InvalidSamplingRate,

    #[error("Missing colon separator")]
    InvalidWifiFormat,

    #[error("Empty SSID")]
    InvalidSsid,

    #[error("{0}")]
    IncompatibleVersion(&'static str),

    #[error("Telemetry busy")]
    Busy,

    #[error("{pin}")]
    RelayFault { pin: u8 },

    /// Comma separated channel identifiers
    #[error("{0}")]
    CalibrationFailed(String),
}

impl CommandError {
    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            CommandError::InvalidPin(_) => "INVALID_PIN",
            CommandError::InvalidState(_) => "INVALID_STATE",
            CommandError::InvalidSamplingRate => "INVALID_SAMPLING_RATE",
            CommandError::InvalidWifiFormat => "INVALID_WIFI_FORMAT",
            CommandError::InvalidSsid => "INVALID_SSID",
            CommandError::IncompatibleVersion(_) => "INCOMPATIBLE_VERSION",
            CommandError::Busy => "BUSY",
            CommandError::RelayFault { .. } => "RELAY_FAULT",
            CommandError::CalibrationFailed(_) => "CALIBRATION_FAILED",
        }
    }

    /// Notification payload for this error
    pub fn wire(&self) -> String {
        format!("ERROR:{}:{}", self.code(), self)
    }
}

/// Socket RPC error body
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: u16,
    pub message: String,
}

impl RpcError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 400: malformed request or missing parameter
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// 404: unknown resource or tool
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// 429: subscription pool exhausted
    pub fn limit_reached() -> Self {
        Self::new(429, "Subscription limit reached")
    }

    /// 503: telemetry lock not acquired in time
    pub fn busy() -> Self {
        Self::new(503, "Telemetry busy")
    }
}

/// Network and server lifecycle failures
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("network link is down")]
    LinkDown,

    #[error("failed to join network {ssid}")]
    JoinFailed { ssid: String },

    #[error("network join timed out after {0} ms")]
    JoinTimeout(u64),

    #[error("network scan failed: {0}")]
    ScanFailed(String),

    #[error("update transport unavailable: {0}")]
    UpdateTransport(String),

    #[error("socket server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
