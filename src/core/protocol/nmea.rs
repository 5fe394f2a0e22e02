//! NMEA 0183 sentence codec
//!
//! Reads and writes `$<fields>*HH\r\n` sentences over a transport. The
//! checksum is the XOR of every byte strictly between `$` and `*`,
//! rendered as two uppercase hex digits.

use crate::core::transport::{Transport, TransportError};
use std::time::Instant;
use thiserror::Error;

/// NMEA codec errors
#[derive(Error, Debug)]
pub enum NmeaError {
    /// Nothing resembling a sentence arrived in time
    #[error("read timed out")]
    Timeout,

    /// Structurally invalid sentence
    #[error("malformed sentence: {0}")]
    Malformed(&'static str),

    /// Checksum mismatch; carries both values for diagnostics
    #[error("checksum mismatch (computed {computed:02X}, expected {expected:02X})")]
    Checksum {
        /// XOR computed over the received field bytes
        computed: u8,
        /// Value parsed from the sentence's two hex digits
        expected: u8,
    },

    /// A field to be sent contains `,`
    #[error("fields may not contain ','")]
    CommaInField,

    /// Hard transport fault (not a timeout)
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for NmeaError {
    fn from(e: TransportError) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e)
        }
    }
}

/// XOR checksum over a byte string
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Read one NMEA sentence, returning its comma-separated fields
///
/// Scans forward for `$` (discarding anything before it), reads through the
/// terminating `\n`, then validates structure and checksum. The first field
/// is the talker/sentence id, e.g. `"GPGGA"`.
pub fn read_sentence(
    transport: &mut dyn Transport,
    deadline: Instant,
) -> Result<Vec<String>, NmeaError> {
    transport.read_until(b"$", deadline)?;
    let line = transport.read_until(b"\n", deadline)?;

    if line.len() < 5 {
        return Err(NmeaError::Malformed("sentence too short"));
    }
    if line[line.len() - 5] != b'*' {
        return Err(NmeaError::Malformed("missing '*'"));
    }
    if &line[line.len() - 2..] != b"\r\n" {
        return Err(NmeaError::Malformed("wrong line ending"));
    }

    let body = &line[..line.len() - 5];
    let computed = checksum(body);
    let expected_hex = std::str::from_utf8(&line[line.len() - 4..line.len() - 2])
        .map_err(|_| NmeaError::Malformed("checksum digits not ASCII"))?;
    let expected = u8::from_str_radix(expected_hex, 16)
        .map_err(|_| NmeaError::Malformed("checksum digits not hex"))?;

    if computed != expected {
        return Err(NmeaError::Checksum { computed, expected });
    }

    let body = std::str::from_utf8(body).map_err(|_| NmeaError::Malformed("fields not ASCII"))?;
    Ok(body.split(',').map(str::to_string).collect())
}

/// Build the wire form of a sentence from its fields
pub fn build_sentence(fields: &[&str]) -> Result<Vec<u8>, NmeaError> {
    if fields.iter().any(|f| f.contains(',')) {
        return Err(NmeaError::CommaInField);
    }

    let body = fields.join(",");
    let sum = checksum(body.as_bytes());

    let mut out = Vec::with_capacity(body.len() + 7);
    out.push(b'$');
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(format!("*{sum:02X}\r\n").as_bytes());
    Ok(out)
}

/// Build and send one sentence, flushing afterwards
///
/// `fields[0]` should be something like `"PSRF100"`.
pub fn send_sentence(transport: &mut dyn Transport, fields: &[&str]) -> Result<(), NmeaError> {
    let sentence = build_sentence(fields)?;
    transport.write_all(&sentence)?;
    transport.flush()?;
    Ok(())
}
