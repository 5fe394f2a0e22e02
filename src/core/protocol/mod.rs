//! Receiver wire protocols
//!
//! SiRF receivers talk one of two protocols over the same line:
//! - NMEA 0183 text sentences (`$...*HH\r\n`, XOR checksum)
//! - SiRF binary frames (`A0 A2 | len | payload | sum | B0 B3`)
//!
//! Which one is active, and at which line parameters, is only discoverable
//! by probing; see [`crate::core::detect`].

pub mod messages;
pub mod nmea;
pub mod sirf;

use crate::core::transport::LineParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol spoken by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// NMEA 0183 text sentences
    Nmea,
    /// SiRF binary frames
    Sirf,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nmea => write!(f, "NMEA"),
            Self::Sirf => write!(f, "SIRF"),
        }
    }
}

/// One point in the autodetection search space: a protocol plus the line
/// parameters it is spoken at
///
/// Compared by equality; the session invariant is that whenever the current
/// mode is known, the transport's actual line configuration matches it
/// exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSettings {
    /// Wire protocol
    pub protocol: Protocol,
    /// Serial line parameters
    pub params: LineParams,
}

impl LineSettings {
    /// NMEA at the given baud rate, 8N1
    pub fn nmea(baud: u32) -> Self {
        Self {
            protocol: Protocol::Nmea,
            params: LineParams::new(baud),
        }
    }

    /// SiRF binary at the given baud rate, 8N1
    pub fn sirf(baud: u32) -> Self {
        Self {
            protocol: Protocol::Sirf,
            params: LineParams::new(baud),
        }
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.protocol, self.params)
    }
}
