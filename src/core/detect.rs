//! Mode and line-settings autodetection
//!
//! A receiver may be in any state at startup: either protocol, at any of
//! several baud rates, possibly with unusual framing. Detection probes an
//! ordered list of expected candidates first, then falls back to an
//! exhaustive sweep of the whole search space. The fallback is slow by
//! nature (hundreds of candidates, one probe timeout each) and is logged
//! loudly because it signals an unexpected receiver state.

use crate::core::protocol::{nmea, sirf, LineSettings, Protocol};
use crate::core::transport::{LineParams, Parity, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Baud rates covered by the exhaustive sweep, most likely first
pub const SCAN_BAUDS: &[u32] = &[4800, 9600, 19200, 38400, 1200, 2400, 57600, 115200];
/// Data bit counts covered by the exhaustive sweep
pub const SCAN_DATA_BITS: &[u8] = &[8, 7];
/// Parities covered by the exhaustive sweep
pub const SCAN_PARITIES: &[Parity] = &[Parity::None, Parity::Even, Parity::Odd];
/// Stop bit counts covered by the exhaustive sweep
pub const SCAN_STOP_BITS: &[u8] = &[1, 2];

/// Detection errors
#[derive(Error, Debug)]
pub enum DetectError {
    /// Every candidate, including the exhaustive sweep, failed. Fatal to
    /// session establishment; there is no further fallback.
    #[error("receiver mode not detected at any line settings")]
    ModeNotDetected,

    /// Detection was cancelled cooperatively
    #[error("detection cancelled")]
    Cancelled,

    /// A hard transport fault interrupted detection
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why a single probe did not match its candidate
///
/// `NoMatch` is the expected, frequent outcome while scanning and is not an
/// error; only hard transport faults abort detection.
enum ProbeFailure {
    NoMatch,
    Fatal(TransportError),
}

/// Detection tuning
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Timeout for each single probe read
    pub probe_timeout: Duration,
    /// How often to retry one candidate before moving on; absorbs a single
    /// corrupted frame without misclassifying the candidate
    pub retry_count: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            retry_count: 2,
        }
    }
}

/// Line-settings autodetector
#[derive(Debug, Clone, Default)]
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    /// Create a detector with the given tuning
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Find the settings the receiver is currently talking at
    ///
    /// Tries `expected` in order, then widens to the full cross product of
    /// supported protocols, bauds, byte sizes, parities and stop bits.
    /// The first candidate that yields one valid frame wins.
    pub fn detect(
        &self,
        transport: &mut dyn Transport,
        expected: &[LineSettings],
        cancel: Option<&AtomicBool>,
    ) -> Result<LineSettings, DetectError> {
        for candidate in expected {
            if self.try_candidate(transport, *candidate, cancel)? {
                info!("Detected {}", candidate);
                return Ok(*candidate);
            }
        }

        warn!(
            "No expected candidate matched; starting exhaustive scan \
             ({} combinations, this can take minutes)",
            2 * SCAN_BAUDS.len() * SCAN_DATA_BITS.len() * SCAN_PARITIES.len() * SCAN_STOP_BITS.len()
        );

        for protocol in [Protocol::Nmea, Protocol::Sirf] {
            for &baud in SCAN_BAUDS {
                for &data_bits in SCAN_DATA_BITS {
                    for &parity in SCAN_PARITIES {
                        for &stop_bits in SCAN_STOP_BITS {
                            let candidate = LineSettings {
                                protocol,
                                params: LineParams {
                                    baud,
                                    data_bits,
                                    parity,
                                    stop_bits,
                                },
                            };
                            if self.try_candidate(transport, candidate, cancel)? {
                                warn!("Exhaustive scan detected {}", candidate);
                                return Ok(candidate);
                            }
                        }
                    }
                }
            }
        }

        Err(DetectError::ModeNotDetected)
    }

    /// Probe one candidate, with per-candidate retries. `Ok(true)` means
    /// the receiver answered with a valid frame at these settings.
    fn try_candidate(
        &self,
        transport: &mut dyn Transport,
        candidate: LineSettings,
        cancel: Option<&AtomicBool>,
    ) -> Result<bool, DetectError> {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(DetectError::Cancelled);
        }

        debug!("Trying {}", candidate);

        if transport.line_params() != candidate.params {
            transport.reconfigure(candidate.params)?;
        }
        transport.flush_input()?;

        for attempt in 0..self.config.retry_count {
            match self.probe(transport, candidate.protocol) {
                Ok(()) => return Ok(true),
                Err(ProbeFailure::NoMatch) => {
                    debug!(
                        "No {} frame at {} (attempt {})",
                        candidate.protocol,
                        candidate.params,
                        attempt + 1
                    );
                }
                Err(ProbeFailure::Fatal(e)) => return Err(e.into()),
            }
        }

        Ok(false)
    }

    /// Attempt exactly one frame read with the candidate protocol's codec.
    fn probe(&self, transport: &mut dyn Transport, protocol: Protocol) -> Result<(), ProbeFailure> {
        let deadline = Instant::now() + self.config.probe_timeout;
        match protocol {
            Protocol::Nmea => match nmea::read_sentence(transport, deadline) {
                Ok(_) => Ok(()),
                Err(nmea::NmeaError::Transport(e)) => Err(ProbeFailure::Fatal(e)),
                Err(_) => Err(ProbeFailure::NoMatch),
            },
            Protocol::Sirf => match sirf::read_frame(transport, deadline) {
                Ok(_) => Ok(()),
                Err(sirf::SirfError::Transport(e)) => Err(ProbeFailure::Fatal(e)),
                Err(_) => Err(ProbeFailure::NoMatch),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::sirf::build_frame;
    use crate::core::transport::ReplayTransport;

    #[test]
    fn test_detect_on_replay_stream() {
        // A replay source accepts any line parameters and serves SIRF
        // frames, so the first SIRF candidate matches.
        let frame = build_frame(&[0x02, 0x01]).unwrap();
        let mut replay = ReplayTransport::new(vec![(0.0, frame)]);

        let detector = Detector::default();
        let expected = [LineSettings::sirf(19200)];
        let detected = detector.detect(&mut replay, &expected, None).unwrap();
        assert_eq!(detected, LineSettings::sirf(19200));
    }

    #[test]
    fn test_cancel_stops_detection() {
        let mut replay = ReplayTransport::new(vec![]);
        let cancel = AtomicBool::new(true);

        let detector = Detector::default();
        let result = detector.detect(&mut replay, &[LineSettings::nmea(4800)], Some(&cancel));
        assert!(matches!(result, Err(DetectError::Cancelled)));
    }
}
