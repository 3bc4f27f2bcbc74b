//! Radio command grammar
//!
//! Commands arrive as short ASCII strings. They are validated and parsed in
//! one step into [`RadioCommand`]; nothing downstream looks at the string
//! again.
//!
//! | Command             | Format                        |
//! |---------------------|-------------------------------|
//! | `CALIBRATE`         | `CALIBRATE`                   |
//! | `OTA`               | `OTA`                         |
//! | `TOGGLE`            | `TOGGLE_<pin>`                |
//! | `SET`               | `SET_<pin>_<ON\|OFF>`         |
//! | `SET_SAMPLING_RATE` | `SET_SAMPLING_RATE_<ms>`      |
//! | `SCAN`              | `SCAN`                        |
//! | `SELECT`            | `SELECT_<ssid>:<password>`    |
//! | `DISCONNECT`        | `DISCONNECT`                  |

use fieldnode_core::config::validate_sampling_interval;

use crate::error::CommandError;

const TOGGLE_PREFIX: &str = "TOGGLE_";
const SET_PREFIX: &str = "SET_";
const SAMPLING_PREFIX: &str = "SET_SAMPLING_RATE_";
const SELECT_PREFIX: &str = "SELECT_";

/// A validated radio command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    Calibrate,
    Ota,
    Toggle { pin: u8 },
    Set { pin: u8, on: bool },
    SetSamplingRate { ms: u16 },
    Scan,
    Select { ssid: String, password: String },
    Disconnect,
}

impl RadioCommand {
    /// Validate `input` against the grammar and the configured relay pins
    pub fn parse(input: &str, relay_pins: &[u8]) -> Result<Self, CommandError> {
        let input = input.trim();
        match input {
            "CALIBRATE" => return Ok(RadioCommand::Calibrate),
            "OTA" => return Ok(RadioCommand::Ota),
            "SCAN" => return Ok(RadioCommand::Scan),
            "DISCONNECT" => return Ok(RadioCommand::Disconnect),
            _ => {}
        }

        // Must precede the SET_ match
        if let Some(rest) = input.strip_prefix(SAMPLING_PREFIX) {
            let ms = rest
                .parse::<u32>()
                .ok()
                .and_then(|ms| validate_sampling_interval(ms).ok())
                .ok_or(CommandError::InvalidSamplingRate)?;
            return Ok(RadioCommand::SetSamplingRate { ms });
        }

        if let Some(rest) = input.strip_prefix(TOGGLE_PREFIX) {
            let pin = relay_pin(rest, relay_pins)?;
            return Ok(RadioCommand::Toggle { pin });
        }

        if let Some(rest) = input.strip_prefix(SET_PREFIX) {
            let (pin, state) = rest.split_once('_').unwrap_or((rest, ""));
            let pin = relay_pin(pin, relay_pins)?;
            let on = match state {
                "ON" => true,
                "OFF" => false,
                other => return Err(CommandError::InvalidState(other.to_owned())),
            };
            return Ok(RadioCommand::Set { pin, on });
        }

        if let Some(rest) = input.strip_prefix(SELECT_PREFIX) {
            let (ssid, password) = rest.split_once(':').ok_or(CommandError::InvalidWifiFormat)?;
            if ssid.is_empty() {
                return Err(CommandError::InvalidSsid);
            }
            return Ok(RadioCommand::Select {
                ssid: ssid.to_owned(),
                password: password.to_owned(),
            });
        }

        Err(CommandError::UnknownCommand(input.to_owned()))
    }

    /// Network commands reply on the wifi channel, the rest on the relay channel
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RadioCommand::Scan | RadioCommand::Select { .. } | RadioCommand::Disconnect
        )
    }
}

fn relay_pin(text: &str, relay_pins: &[u8]) -> Result<u8, CommandError> {
    match text.parse::<u8>() {
        Ok(pin) if relay_pins.contains(&pin) => Ok(pin),
        _ => Err(CommandError::InvalidPin(text.to_owned())),
    }
}
