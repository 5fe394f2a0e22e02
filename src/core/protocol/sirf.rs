//! SiRF binary frame codec
//!
//! Frame layout on the wire:
//!
//! ```text
//! A0 A2 | length:u16 BE | payload[length] | checksum:u16 BE | B0 B3
//! ```
//!
//! The checksum is the sum of the payload bytes masked to 15 bits. It is
//! not a CRC: it catches the firmware's on-wire corruption, nothing more,
//! and strengthening it would break interoperability with real hardware.

use crate::core::transport::{Transport, TransportError};
use std::time::Instant;
use thiserror::Error;
use tracing::trace;

/// Frame start marker
pub const START: [u8; 2] = [0xA0, 0xA2];
/// Frame end marker
pub const END: [u8; 2] = [0xB0, 0xB3];
/// Largest payload a frame can carry
pub const MAX_PAYLOAD: usize = 0x7FFF;

/// SiRF codec errors
#[derive(Error, Debug)]
pub enum SirfError {
    /// A read inside the frame timed out. Reported uniformly for every
    /// stage of parsing: a partial frame carries no useful recovery
    /// information, so the caller cannot tell how far parsing got.
    #[error("malformed message (timeout)")]
    Timeout,

    /// Payload checksum mismatch
    #[error("checksum mismatch (computed {computed:#06X}, expected {expected:#06X})")]
    Checksum {
        /// Sum computed over the received payload
        computed: u16,
        /// Value read from the frame trailer
        expected: u16,
    },

    /// The two bytes after the checksum were not `B0 B3`
    #[error("invalid end marker {0:02X?}")]
    InvalidEnd([u8; 2]),

    /// Payload too large to frame
    #[error("payload too long ({0} bytes)")]
    TooLong(usize),

    /// Leading payload byte names no registered message type. Expected and
    /// frequent; callers skip and retry.
    #[error("unrecognized message {0}")]
    Unrecognized(u8),

    /// A payload was shorter or longer than its message type requires
    #[error("message {id} has wrong payload length ({len} bytes)")]
    Length {
        /// Message type id
        id: u8,
        /// Received payload length
        len: usize,
    },

    /// Hard transport fault (not a timeout)
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for SirfError {
    fn from(e: TransportError) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e)
        }
    }
}

/// 15-bit additive checksum over a payload
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
        & 0x7FFF
}

/// Read one frame, returning its payload
///
/// Scans forward for the start marker, discarding anything before it;
/// that is how the codec resynchronizes after noise or a mid-stream start.
pub fn read_frame(transport: &mut dyn Transport, deadline: Instant) -> Result<Vec<u8>, SirfError> {
    transport.read_until(&START, deadline)?;

    let len_bytes = transport.read_exact(2, deadline)?;
    let length = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

    let payload = transport.read_exact(length, deadline)?;

    let sum_bytes = transport.read_exact(2, deadline)?;
    let expected = u16::from_be_bytes([sum_bytes[0], sum_bytes[1]]);
    let computed = checksum(&payload);
    if computed != expected {
        return Err(SirfError::Checksum { computed, expected });
    }

    let ending = transport.read_exact(2, deadline)?;
    if ending != END {
        return Err(SirfError::InvalidEnd([ending[0], ending[1]]));
    }

    trace!("Frame received: {}", hex::encode(&payload));
    Ok(payload)
}

/// Build the wire form of a frame around `payload`
pub fn build_frame(payload: &[u8]) -> Result<Vec<u8>, SirfError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(SirfError::TooLong(payload.len()));
    }

    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&START);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(payload).to_be_bytes());
    out.extend_from_slice(&END);
    Ok(out)
}

/// Frame and send a payload, flushing afterwards
pub fn send_frame(transport: &mut dyn Transport, payload: &[u8]) -> Result<(), SirfError> {
    let frame = build_frame(payload)?;
    transport.write_all(&frame)?;
    transport.flush()?;
    Ok(())
}

/// Decode an 8-byte double as the GSW3 firmware transmits it: the two
/// 4-byte halves are swapped relative to standard big-endian order.
///
/// Only valid for the GSW3 chip family; other firmware is out of scope.
pub fn sirf_double(data: &[u8; 8]) -> f64 {
    let mut word = [0u8; 8];
    word[..4].copy_from_slice(&data[4..]);
    word[4..].copy_from_slice(&data[..4]);
    f64::from_be_bytes(word)
}

/// Decode a 4-byte single from the wire
pub fn sirf_single(data: &[u8; 4]) -> f32 {
    f32::from_be_bytes(*data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::ReplayTransport;

    fn deadline() -> Instant {
        Instant::now() + std::time::Duration::from_secs(1)
    }

    #[test]
    fn test_checksum_masked_to_15_bits() {
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x0006);
        // 256 * 0xFF = 0xFF00; masked to 15 bits.
        assert_eq!(checksum(&[0xFF; 256]), 0xFF00 & 0x7FFF);
    }

    #[test]
    fn test_round_trip() {
        let payload = vec![0x02, 0x00, 0x01, 0xFF, 0x80];
        let wire = build_frame(&payload).unwrap();

        let mut replay = ReplayTransport::new(vec![(0.0, wire)]);
        assert_eq!(read_frame(&mut replay, deadline()).unwrap(), payload);
    }

    #[test]
    fn test_too_long_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            build_frame(&payload),
            Err(SirfError::TooLong(_))
        ));
    }

    #[test]
    fn test_corrupt_payload_byte_fails_checksum() {
        let mut wire = build_frame(&[0x02, 0x10, 0x20, 0x30]).unwrap();
        wire[5] ^= 0xFF; // second payload byte

        let mut replay = ReplayTransport::new(vec![(0.0, wire)]);
        assert!(matches!(
            read_frame(&mut replay, deadline()),
            Err(SirfError::Checksum { .. })
        ));
    }

    #[test]
    fn test_invalid_end_marker() {
        let mut wire = build_frame(&[0x02]).unwrap();
        let n = wire.len();
        wire[n - 1] = 0x00;

        let mut replay = ReplayTransport::new(vec![(0.0, wire)]);
        match read_frame(&mut replay, deadline()) {
            Err(SirfError::InvalidEnd(bytes)) => assert_eq!(bytes, [0xB0, 0x00]),
            other => panic!("expected invalid end, got {other:?}"),
        }
    }

    #[test]
    fn test_resynchronization() {
        // Garbage containing an accidental start marker, then a plausible
        // but checksum-invalid frame, then a valid frame. Retrying past the
        // failure must yield exactly the valid frame.
        let good = build_frame(&[0x07, 0xAA]).unwrap();
        let mut bad = build_frame(&[0x02, 0x01]).unwrap();
        bad[4] ^= 0x55;

        let mut stream = vec![0x13, 0x37]; // line noise
        stream.extend_from_slice(&bad); // its A0 A2 is the accidental marker
        stream.extend_from_slice(&good);

        let mut replay = ReplayTransport::new(vec![(0.0, stream)]);

        let first = read_frame(&mut replay, deadline());
        assert!(matches!(first, Err(SirfError::Checksum { .. })));

        let second = read_frame(&mut replay, deadline()).unwrap();
        assert_eq!(second, vec![0x07, 0xAA]);
    }

    #[test]
    fn test_sirf_double_half_swap() {
        let value = 1234.5678_f64;
        let be = value.to_be_bytes();
        let mut wire = [0u8; 8];
        wire[..4].copy_from_slice(&be[4..]);
        wire[4..].copy_from_slice(&be[..4]);

        assert_eq!(sirf_double(&wire), value);
    }

    #[test]
    fn test_sirf_single_big_endian() {
        let value = 96.25_f32;
        assert_eq!(sirf_single(&value.to_be_bytes()), value);
    }
}
