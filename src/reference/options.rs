//! Small value types carried by every reference: versions, invocation modes
//! and endpoint selection.

use super::ReferenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn parse_version(input: &str) -> Result<(u8, u8), ReferenceError> {
    let malformed = || ReferenceError::MalformedVersion(input.to_owned());
    let (major, minor) = input.trim().split_once('.').ok_or_else(malformed)?;
    let major = major.parse().map_err(|_| malformed())?;
    let minor = minor.parse().map_err(|_| malformed())?;
    Ok((major, minor))
}

/// Version of the payload encoding used by requests sent through a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodingVersion {
    pub major: u8,
    pub minor: u8,
}

pub const ENCODING_1_0: EncodingVersion = EncodingVersion { major: 1, minor: 0 };
pub const ENCODING_1_1: EncodingVersion = EncodingVersion { major: 1, minor: 1 };

impl Default for EncodingVersion {
    fn default() -> Self {
        ENCODING_1_1
    }
}

impl fmt::Display for EncodingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for EncodingVersion {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (major, minor) = parse_version(input)?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for EncodingVersion {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EncodingVersion> for String {
    fn from(version: EncodingVersion) -> Self {
        version.to_string()
    }
}

/// Version of the request protocol spoken over a reference's connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

pub const PROTOCOL_1_0: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

impl Default for ProtocolVersion {
    fn default() -> Self {
        PROTOCOL_1_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (major, minor) = parse_version(input)?;
        Ok(Self { major, minor })
    }
}

/// How requests are delivered through a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    #[default]
    Twoway,
    Oneway,
    BatchOneway,
    Datagram,
    BatchDatagram,
}

impl InvocationMode {
    /// Only twoway invocations can carry a reply.
    pub fn is_twoway(self) -> bool {
        self == InvocationMode::Twoway
    }

    pub fn is_batch(self) -> bool {
        matches!(self, InvocationMode::BatchOneway | InvocationMode::BatchDatagram)
    }

    pub fn is_datagram(self) -> bool {
        matches!(self, InvocationMode::Datagram | InvocationMode::BatchDatagram)
    }

    /// Option used for this mode in the proxy string form.
    pub fn flag(self) -> &'static str {
        match self {
            InvocationMode::Twoway => "-t",
            InvocationMode::Oneway => "-o",
            InvocationMode::BatchOneway => "-O",
            InvocationMode::Datagram => "-d",
            InvocationMode::BatchDatagram => "-D",
        }
    }

    pub(crate) fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "-t" => Some(InvocationMode::Twoway),
            "-o" => Some(InvocationMode::Oneway),
            "-O" => Some(InvocationMode::BatchOneway),
            "-d" => Some(InvocationMode::Datagram),
            "-D" => Some(InvocationMode::BatchDatagram),
            _ => None,
        }
    }
}

/// Order in which the connection layer tries a reference's endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSelection {
    #[default]
    Random,
    Ordered,
}
