//! # Sirfline Core Library
//!
//! A protocol stack for SiRF-based GPS receivers:
//! - NMEA 0183 sentence codec (XOR checksum)
//! - SiRF binary frame codec (15-bit additive checksum, GSW3 float quirk)
//! - Mode and line-settings autodetection (protocol × baud × byte size ×
//!   parity × stop bits)
//! - Protocol switching with settle-time handling and verification
//! - Message dispatch with iterator- and observer-style consumption
//!
//! ## Example
//!
//! ```rust,no_run
//! use sirfline_core::{LineParams, SerialTransport, Session, SessionConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", LineParams::new(4800))?;
//!     let mut session = Session::open(Box::new(transport), SessionConfig::default())?;
//!
//!     session.nmea_to_sirf()?;
//!     session.poll_software_version()?;
//!
//!     loop {
//!         let message = session.read_message(None)?;
//!         println!("{message:?}");
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod core;

// Re-exports for convenience
pub use crate::core::detect::{DetectError, Detector, DetectorConfig, SCAN_BAUDS};
pub use crate::core::protocol::messages::{
    decode, Message, MessageKind, PollSoftwareVersion, SetMessageRate, SirfCommand,
    SwitchToNmeaProtocol,
};
pub use crate::core::protocol::nmea::NmeaError;
pub use crate::core::protocol::sirf::SirfError;
pub use crate::core::protocol::{LineSettings, Protocol};
pub use crate::core::session::{
    MessageObserver, Messages, Mode, Session, SessionConfig, SessionError, SourceKind,
};
pub use crate::core::transport::{
    list_ports, LineParams, Parity, ReplayTransport, SerialTransport, Transport, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
