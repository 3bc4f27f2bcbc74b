//! Operator console standing in for the radio transport on a host
//!
//! Each stdin line is one event:
//!
//! | Line                      | Effect                                   |
//! |---------------------------|------------------------------------------|
//! | `connect [<version>]`     | radio client connects, optional handshake |
//! | `disconnect`              | radio client disconnects                 |
//! | `relay <command>`         | write on the relay characteristic        |
//! | `wifi <command>`          | write on the wifi characteristic         |
//! | `link <up\|down>`         | drop or rejoin the network link          |
//! | `bus <1\|2> <up\|down>`   | attach or detach a simulated ADC         |
//! | `stats`                   | print acquisition counters               |
//! | `quit`                    | shut down                                |

use fieldnode_link::Characteristic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect { version: Option<String> },
    Disconnect,
    Write { characteristic: Characteristic, payload: String },
    Link { up: bool },
    Bus { channel: u8, present: bool },
    Stats,
    Quit,
}

fn up_down(word: &str) -> Result<bool, String> {
    match word {
        "up" => Ok(true),
        "down" => Ok(false),
        other => Err(format!("expected up or down, got {:?}", other)),
    }
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "connect" => Ok(ConsoleCommand::Connect {
                version: (!rest.is_empty()).then(|| rest.to_owned()),
            }),
            "disconnect" => Ok(ConsoleCommand::Disconnect),
            "relay" | "wifi" if !rest.is_empty() => Ok(ConsoleCommand::Write {
                characteristic: if word == "relay" {
                    Characteristic::Relay
                } else {
                    Characteristic::Wifi
                },
                payload: rest.to_owned(),
            }),
            "relay" | "wifi" => Err(format!("{} needs a command", word)),
            "link" => Ok(ConsoleCommand::Link { up: up_down(rest)? }),
            "bus" => {
                let (channel, state) = rest
                    .split_once(' ')
                    .ok_or_else(|| "usage: bus <1|2> <up|down>".to_owned())?;
                let channel = match channel {
                    "1" => 1,
                    "2" => 2,
                    other => return Err(format!("unknown channel {:?}", other)),
                };
                Ok(ConsoleCommand::Bus {
                    channel,
                    present: up_down(state.trim())?,
                })
            }
            "stats" => Ok(ConsoleCommand::Stats),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown console command {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_writes_keep_payload_verbatim() {
        assert_eq!(
            ConsoleCommand::parse("wifi SELECT_my net:pa ss"),
            Ok(ConsoleCommand::Write {
                characteristic: Characteristic::Wifi,
                payload: "SELECT_my net:pa ss".into(),
            })
        );
        assert!(ConsoleCommand::parse("relay").is_err());
    }

    #[test]
    fn connect_version_is_optional() {
        assert_eq!(
            ConsoleCommand::parse("connect"),
            Ok(ConsoleCommand::Connect { version: None })
        );
        assert_eq!(
            ConsoleCommand::parse("connect 1.2.0"),
            Ok(ConsoleCommand::Connect {
                version: Some("1.2.0".into())
            })
        );
    }

    #[test]
    fn bus_and_link_switches() {
        assert_eq!(
            ConsoleCommand::parse("bus 2 down"),
            Ok(ConsoleCommand::Bus {
                channel: 2,
                present: false
            })
        );
        assert!(ConsoleCommand::parse("bus 3 up").is_err());
        assert_eq!(
            ConsoleCommand::parse("link up"),
            Ok(ConsoleCommand::Link { up: true })
        );
        assert!(ConsoleCommand::parse("link sideways").is_err());
    }
}
