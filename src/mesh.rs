//! Mesh identity and transport events
//!
//! ## Responsibilities
//!
//! - EUI-64 device identity (colon-separated hex octets on the wire)
//! - Tracked cluster/attribute ids for the current-sensor profile
//! - Inbound event shape produced by the radio transport
//! - Raw report value coercion

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Manufacturer-specific cluster carrying the three current channels
pub const CURRENT_SENSOR_CLUSTER: u16 = 0xFC01;

/// 64-bit mesh device identity (EUI-64)
///
/// Rendered as colon-separated hex octets, e.g. `aa:bb:cc:dd:ee:ff:00:11`.
/// Parsing accepts either case; formatting is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceId([u8; 8]);

impl DeviceId {
    pub fn new(octets: [u8; 8]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 8] {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .iter()
            .map(|octet| format!("{:02x}", octet))
            .collect::<Vec<_>>()
            .join(":");
        f.write_str(&text)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 8 {
            return Err(Error::Parse(format!(
                "invalid EUI-64 '{}': expected 8 octets",
                s
            )));
        }

        let mut octets = [0u8; 8];
        for (i, part) in parts.iter().enumerate() {
            octets[i] = u8::from_str_radix(part, 16).map_err(|_| {
                Error::Parse(format!("invalid EUI-64 '{}': bad octet '{}'", s, part))
            })?;
        }

        Ok(Self(octets))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Tracked attribute set under [`CURRENT_SENSOR_CLUSTER`]
///
/// A device's reading is complete once every channel has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorAttribute {
    /// Phase 1 current (attribute 0x0001)
    Current1,
    /// Phase 2 current (attribute 0x0002)
    Current2,
    /// Phase 3 current (attribute 0x0003)
    Current3,
}

impl SensorAttribute {
    /// All tracked attributes, in channel order
    pub const ALL: [SensorAttribute; 3] = [Self::Current1, Self::Current2, Self::Current3];

    /// Map a raw attribute id to a tracked attribute
    ///
    /// Ids outside the tracked set return `None` and are treated as
    /// normal mesh noise upstream, not as errors.
    pub fn from_raw(attribute_id: u16) -> Option<Self> {
        match attribute_id {
            0x0001 => Some(Self::Current1),
            0x0002 => Some(Self::Current2),
            0x0003 => Some(Self::Current3),
            _ => None,
        }
    }

    /// Raw attribute id on the wire
    pub fn raw(&self) -> u16 {
        match self {
            Self::Current1 => 0x0001,
            Self::Current2 => 0x0002,
            Self::Current3 => 0x0003,
        }
    }

    /// Field name this channel uses in the sink payload
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Current1 => "current_1",
            Self::Current2 => "current_2",
            Self::Current3 => "current_3",
        }
    }
}

impl fmt::Display for SensorAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_key())
    }
}

/// Coerce a raw report value to a numeric reading
///
/// Accepts JSON numbers and numeric strings, finite values only:
/// serde_json renders a non-finite float as `null`, which must never
/// reach the wire. Anything else is a malformed reading: the caller
/// logs a warning and drops it without touching state.
pub fn coerce_reading(value: &serde_json::Value) -> Result<f32> {
    let amps = match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| Error::MalformedReading(format!("unrepresentable number: {}", n)))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f32>()
            .map_err(|_| Error::MalformedReading(format!("non-numeric value: '{}'", s)))?,
        other => {
            return Err(Error::MalformedReading(format!(
                "non-numeric value: {}",
                other
            )))
        }
    };

    if !amps.is_finite() {
        return Err(Error::MalformedReading(format!(
            "non-finite reading: {}",
            value
        )));
    }

    Ok(amps)
}

/// Inbound mesh events produced by the radio transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NetworkEvent {
    /// A device (re)joined the network
    DeviceJoined { device: DeviceId },
    /// A device announced its departure
    DeviceLeft { device: DeviceId },
    /// Coordinator-side removal of a device
    DeviceRemoved { device: DeviceId },
    /// Attribute report from a device endpoint
    AttributeUpdated {
        device: DeviceId,
        cluster: u16,
        attribute: u16,
        value: serde_json::Value,
    },
}

impl NetworkEvent {
    /// Parse one newline-delimited JSON transport line
    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
