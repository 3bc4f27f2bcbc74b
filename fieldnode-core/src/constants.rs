//! Timing, sizing and threshold constants for FieldNode
//!
//! Every tunable the acquisition engine and the two control protocols share
//! lives here, with units in the name. Values mirror the deployed firmware;
//! change them together with the client applications that depend on them.

// ===== SENSOR HEALTH =====

/// Consecutive failed bus reads before a channel is marked unavailable.
pub const MAX_CONSECUTIVE_ERRORS: u8 = 5;

/// Minimum spacing between recovery probes of an unavailable device.
///
/// Keeps a known-bad device from costing a bus transaction every cycle.
pub const RECOVERY_INTERVAL_MS: u64 = 5_000;

/// Configure attempts made after a successful probe during device init.
pub const INIT_CONFIGURE_ATTEMPTS: u8 = 3;

// ===== CALIBRATION =====

/// Samples averaged into one zero-offset.
pub const CALIBRATION_SAMPLES: usize = 16;

/// Delay between calibration samples.
pub const CALIBRATION_SAMPLE_DELAY_MS: u64 = 10;

/// Back-off before retrying a calibration slot whose read failed.
pub const CALIBRATION_RETRY_DELAY_MS: u64 = 50;

// ===== ACQUISITION =====

/// Averaging window (ring buffer capacity) per channel.
pub const AVG_WINDOW: usize = 10;

/// Bounded wait for the shared telemetry lock.
///
/// Shared by the acquisition task and both dispatchers. A miss skips the
/// operation; it is never retried within the same cycle.
pub const TELEMETRY_LOCK_WAIT_MS: u64 = 10;

/// Sampling period applied when nothing valid is persisted (~60 Hz).
pub const DEFAULT_SAMPLING_INTERVAL_MS: u16 = 17;

/// Shortest accepted sampling period.
pub const MIN_SAMPLING_INTERVAL_MS: u16 = 5;

/// Longest accepted sampling period.
pub const MAX_SAMPLING_INTERVAL_MS: u16 = 1_000;

// ===== RELAYS =====

/// Number of relay outputs on the board.
pub const RELAY_COUNT: usize = 4;

/// Default GPIO assignment of the relay outputs, in logical order.
pub const DEFAULT_RELAY_PINS: [u8; RELAY_COUNT] = [25, 27, 32, 26];

// ===== PERSISTED KEYS =====

/// Key holding the persisted sampling period.
pub const KEY_SAMPLING_INTERVAL: &str = "samplingIntervalMs";

/// Key holding the stored network name.
pub const KEY_SSID: &str = "ssid";

/// Key holding the stored network password.
pub const KEY_PASSWORD: &str = "password";

/// Prefix of the per-relay persisted keys (`relay0` .. `relay3`).
pub const KEY_RELAY_PREFIX: &str = "relay";

// ===== PROTOCOL =====

/// Radio protocol version, major component.
pub const PROTOCOL_VERSION_MAJOR: u16 = 1;

/// Radio protocol version, minor component.
pub const PROTOCOL_VERSION_MINOR: u16 = 2;

/// Radio protocol version, patch component.
pub const PROTOCOL_VERSION_PATCH: u16 = 0;

/// Full radio protocol version string.
pub const PROTOCOL_VERSION: &str = "1.2.0";

/// Averaged magnitudes below this are reported as exactly zero.
pub const TELEMETRY_DEADBAND: f32 = 1.0;

/// Minimum spacing between radio telemetry notifications.
pub const NOTIFICATION_INTERVAL_MS: u64 = 100;

/// Slack allowed below the notification interval for ticker and lock jitter.
pub const NOTIFICATION_JITTER_MS: u64 = 10;

/// Telemetry frames at or above this size are dropped.
pub const MAX_TELEMETRY_FRAME_BYTES: usize = 512;

// ===== SOCKET SERVER LIFECYCLE =====

/// Lock wait used when starting the socket listener.
pub const LIFECYCLE_SETUP_WAIT_MS: u64 = 500;

/// Lock wait used by steady-state lifecycle checks.
pub const LIFECYCLE_CHECK_WAIT_MS: u64 = 100;

/// Backoff between listener start attempts while the link is up.
pub const LISTENER_RETRY_BACKOFF_MS: u64 = 5_000;

/// Interval of the subscription change poll.
pub const SUBSCRIPTION_POLL_MS: u64 = 200;

/// Interval between link-recovery supervisor passes.
pub const LINK_SUPERVISOR_INTERVAL_MS: u64 = 30_000;

/// Upper bound on a single network join attempt.
pub const NETWORK_JOIN_TIMEOUT_MS: u64 = 10_000;
