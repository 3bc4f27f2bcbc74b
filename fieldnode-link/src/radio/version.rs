//! Protocol version handshake
//!
//! A client is accepted when its major version equals ours and its minor
//! version is not newer than ours. The patch component is ignored.

use std::fmt;

use fieldnode_core::constants::{
    PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR, PROTOCOL_VERSION_PATCH,
};

use crate::error::CommandError;

/// `major.minor.patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    /// Version spoken by this node
    pub const CURRENT: ProtocolVersion = ProtocolVersion {
        major: PROTOCOL_VERSION_MAJOR,
        minor: PROTOCOL_VERSION_MINOR,
        patch: PROTOCOL_VERSION_PATCH,
    };

    /// Lenient parse: missing or non-numeric components read as 0
    pub fn parse_lenient(text: &str) -> Self {
        let mut parts = text.trim().splitn(3, '.').map(|p| p.parse::<u16>().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    /// Whether a client speaking `self` may talk to `server`
    pub fn check_against(self, server: ProtocolVersion) -> Result<(), CommandError> {
        if self.major != server.major {
            return Err(CommandError::IncompatibleVersion("Major version mismatch"));
        }
        if self.minor > server.minor {
            return Err(CommandError::IncompatibleVersion(
                "Client using newer minor version",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Check a client version string against this node's protocol version
pub fn check_protocol_version(client: &str) -> Result<(), CommandError> {
    ProtocolVersion::parse_lenient(client).check_against(ProtocolVersion::CURRENT)
}
