//! Byte transports feeding the protocol codecs
//!
//! A transport is one duplex byte stream with serial line parameters:
//! either a live port or a deterministic replay of a recorded stream.
//! All reads are bounded by an absolute deadline so that a sequence of
//! smaller reads assembling one frame shares a single overall timeout.

mod replay;
mod serial;

pub use replay::ReplayTransport;
pub use serial::{list_ports, SerialTransport};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Serial line parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "N"),
            Self::Odd => write!(f, "O"),
            Self::Even => write!(f, "E"),
        }
    }
}

/// Serial line parameters: baud rate, byte size, parity, stop bits
///
/// A value type compared by equality; both ends of the link must agree on
/// it exactly before any frame can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineParams {
    /// Baud rate
    pub baud: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
}

impl LineParams {
    /// Create line parameters with the common 8N1 framing
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }
}

impl Default for LineParams {
    fn default() -> Self {
        Self::new(4800)
    }
}

impl fmt::Display for LineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} baud ({}{}{})",
            self.baud, self.data_bits, self.parity, self.stop_bits
        )
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// The deadline elapsed before the requested bytes arrived
    #[error("read timed out")]
    TimedOut,

    /// A replay source ran out of recorded bytes
    #[error("end of recorded stream")]
    EndOfStream,

    /// Port not found
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// Permission denied opening the port
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Opening or reopening the line failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The underlying line is closed
    #[error("not connected")]
    NotConnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for the "nothing arrived in time" case, which is always safe
    /// to retry with a fresh deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// A duplex byte stream with serial line parameters and deadline-bounded reads
///
/// Implementations keep an internal lookahead buffer so that `read_until`
/// can carry a partial delimiter match across underlying reads without
/// consuming bytes a later call would need. `flush_input` clears that
/// buffer along with the device input queue; stale bytes from an abandoned
/// parse attempt would otherwise desynchronize the next one.
pub trait Transport {
    /// Read exactly `count` bytes, or fail with `TimedOut` once `deadline`
    /// passes.
    fn read_exact(&mut self, count: usize, deadline: Instant) -> Result<Vec<u8>, TransportError>;

    /// Read until `delimiter` appears in the stream, or fail with `TimedOut`
    /// once `deadline` passes.
    ///
    /// Returns everything read up to and including the delimiter; bytes
    /// before the match are part of the returned value, bytes after it stay
    /// buffered for the next read.
    fn read_until(&mut self, delimiter: &[u8], deadline: Instant)
        -> Result<Vec<u8>, TransportError>;

    /// Write all of `data` to the line.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flush buffered output to the device.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Discard unread input, including the internal lookahead buffer.
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Apply new line parameters. On real hardware this closes and reopens
    /// the underlying line; the new parameters only take effect then.
    fn reconfigure(&mut self, params: LineParams) -> Result<(), TransportError>;

    /// Current line parameters.
    fn line_params(&self) -> LineParams;

    /// Arrival time of the most recently read bytes, in seconds from the
    /// transport's epoch. Recorded sources return the recorded timestamp,
    /// so timing-based consumers behave identically under replay.
    fn last_arrival(&self) -> Option<f64>;

    /// Human-readable description for logs.
    fn connection_info(&self) -> String;
}

/// First index of `needle` within `haystack`, if any.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
