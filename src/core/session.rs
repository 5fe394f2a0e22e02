//! Receiver session: mode tracking, message dispatch, mode switching
//!
//! A session owns one transport (a live line or a replay), the current
//! mode, and the retry loops that turn a lossy frame stream into typed
//! messages. All shared mutable state (the mode field and the transport's
//! lookahead buffer) lives inside the session and is never handed out by
//! reference.

use crate::core::detect::{DetectError, Detector, DetectorConfig};
use crate::core::protocol::messages::{
    self, Message, MessageKind, PollSoftwareVersion, SetMessageRate, SirfCommand,
    SwitchToNmeaProtocol,
};
use crate::core::protocol::{nmea, sirf, LineSettings, Protocol};
use crate::core::transport::{Parity, ReplayTransport, Transport, TransportError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Firmware family the mixed-order float decoding is valid for
const SUPPORTED_VERSION_PREFIX: &str = "GSW3";

/// What a session reads from, chosen at construction and never changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A live serial receiver
    Live,
    /// A recorded byte stream
    Replay,
}

/// Current receiver mode
///
/// Whenever this is `Detected`, the transport's actual line configuration
/// matches it exactly; every configuration change re-establishes that
/// invariant or falls back to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mode has not been detected, or the last switch attempt failed
    Unknown,
    /// Receiver confirmed talking at these settings
    Detected(LineSettings),
}

impl Mode {
    /// Settings if the mode is known
    pub fn settings(&self) -> Option<LineSettings> {
        match self {
            Self::Unknown => None,
            Self::Detected(settings) => Some(*settings),
        }
    }

    /// Protocol if the mode is known
    pub fn protocol(&self) -> Option<Protocol> {
        self.settings().map(|s| s.protocol)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Detected(settings) => write!(f, "{settings}"),
        }
    }
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A SIRF-only operation was attempted in another mode
    #[error("receiver is not in SIRF mode (current mode: {0})")]
    NotSirfMode(Mode),

    /// The current mode is unknown; detection must succeed first
    #[error("receiver mode is unknown")]
    ModeUnknown,

    /// The receiver did not honor a protocol switch command. Fatal:
    /// silently adopting the detected protocol would corrupt all
    /// subsequent parsing expectations.
    #[error("mode switch failed: requested {requested}, detected {detected}")]
    SwitchProtocolMismatch {
        /// Settings the switch asked for
        requested: LineSettings,
        /// Settings actually detected afterwards
        detected: LineSettings,
    },

    /// Mode switching has no meaning for a recorded stream
    #[error("mode switching is not supported on a replay session")]
    ReplaySession,

    /// The caller's overall deadline elapsed
    #[error("wait deadline elapsed")]
    Timeout,

    /// The operation was cancelled cooperatively
    #[error("cancelled")]
    Cancelled,

    /// The recorded stream ended (clean, replay only)
    #[error("end of recorded stream")]
    EndOfStream,

    /// Detection failed
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// Hard transport fault
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// NMEA send failed
    #[error(transparent)]
    Nmea(#[from] nmea::NmeaError),

    /// SIRF send failed
    #[error(transparent)]
    Sirf(#[from] sirf::SirfError),
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for each single frame read
    pub read_timeout: Duration,
    /// Delay after a switch command before the chip answers reliably at
    /// the new settings. A hardware characteristic, not a tunable.
    pub settle_time: Duration,
    /// Inter-frame gap treated as a cycle boundary. The wire protocol has
    /// no epoch marker, so boundaries are approximate by nature.
    pub cycle_gap: Duration,
    /// Cycles between status log lines during `run`; 0 disables them
    pub status_interval: u32,
    /// Baud rate used when switching to NMEA
    pub nmea_speed: u32,
    /// Baud rate used when switching to SIRF
    pub sirf_speed: u32,
    /// Ordered fast-path candidates for detection
    pub expected: Vec<LineSettings>,
    /// Detector tuning
    pub detector: DetectorConfig,
}

impl SessionConfig {
    /// Baud rates a receiver is usually found at
    pub const EXPECTED_SPEEDS: [u32; 3] = [4800, 19200, 9600];

    /// Set the cycle-boundary gap
    #[must_use]
    pub fn cycle_gap(mut self, gap: Duration) -> Self {
        self.cycle_gap = gap;
        self
    }

    /// Set the expected detection candidates
    #[must_use]
    pub fn expected(mut self, expected: Vec<LineSettings>) -> Self {
        self.expected = expected;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut expected = Vec::new();
        for speed in Self::EXPECTED_SPEEDS {
            expected.push(LineSettings::nmea(speed));
            expected.push(LineSettings::sirf(speed));
        }
        Self {
            read_timeout: Duration::from_secs(2),
            settle_time: Duration::from_millis(500),
            cycle_gap: Duration::from_millis(400),
            status_interval: 30,
            nmea_speed: 4800,
            sirf_speed: 19200,
            expected,
            detector: DetectorConfig::default(),
        }
    }
}

/// An observer fed messages by [`Session::run`]
pub trait MessageObserver {
    /// Message kinds this observer wants to see
    fn observed_kinds(&self) -> Vec<MessageKind>;

    /// Called for each received message of an observed kind
    fn notify(&mut self, message: &Message);
}

/// An open receiver session
pub struct Session {
    transport: Box<dyn Transport>,
    source: SourceKind,
    mode: Mode,
    config: SessionConfig,
    detector: Detector,
    version: Option<String>,
    cancel: Option<Arc<AtomicBool>>,
    closed: bool,
}

impl Session {
    /// Open a session on a live transport, detecting the receiver's mode
    ///
    /// Fails with [`DetectError::ModeNotDetected`] if the receiver answers
    /// at no candidate settings at all; there is no further fallback.
    pub fn open(transport: Box<dyn Transport>, config: SessionConfig) -> Result<Self, SessionError> {
        let detector = Detector::new(config.detector.clone());
        let mut session = Self {
            transport,
            source: SourceKind::Live,
            mode: Mode::Unknown,
            config,
            detector,
            version: None,
            cancel: None,
            closed: false,
        };

        let detected =
            session
                .detector
                .detect(&mut *session.transport, &session.config.expected, None)?;
        session.mode = Mode::Detected(detected);
        session.log_status();
        Ok(session)
    }

    /// Open a session over a recorded byte stream
    ///
    /// Recordings carry the SIRF binary stream; no probing happens (it
    /// would consume recorded frames), and mode switching is rejected.
    pub fn replay(transport: ReplayTransport, config: SessionConfig) -> Self {
        let sirf_speed = config.sirf_speed;
        let detector = Detector::new(config.detector.clone());
        Self {
            transport: Box::new(transport),
            source: SourceKind::Replay,
            mode: Mode::Detected(LineSettings::sirf(sirf_speed)),
            config,
            detector,
            version: None,
            cancel: None,
            closed: false,
        }
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Live or replay, fixed at construction
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Firmware version string, if it has been polled
    pub fn software_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Arrival time of the most recently read frame, in seconds from the
    /// source's epoch (recorded time under replay)
    pub fn last_arrival(&self) -> Option<f64> {
        self.transport.last_arrival()
    }

    /// Install a flag that read and detection loops check at each
    /// iteration boundary; setting it interrupts them cleanly.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn log_status(&self) {
        info!("Receiver in {} mode ({})", self.mode, self.transport.connection_info());
    }

    fn require_sirf(&self) -> Result<(), SessionError> {
        match self.mode.protocol() {
            Some(Protocol::Sirf) => Ok(()),
            _ => Err(SessionError::NotSirfMode(self.mode)),
        }
    }

    /// Read one recognized message, silently skipping unrecognized ids
    ///
    /// Per-read timeouts and malformed frames are logged and absorbed;
    /// the link is inherently lossy. Without `deadline` this blocks until
    /// a recognized message arrives; a quiet receiver blocks indefinitely.
    pub fn read_message(&mut self, deadline: Option<Instant>) -> Result<Message, SessionError> {
        self.require_sirf()?;

        loop {
            if self.cancelled() {
                return Err(SessionError::Cancelled);
            }
            let mut read_deadline = Instant::now() + self.config.read_timeout;
            if let Some(overall) = deadline {
                if overall <= Instant::now() {
                    return Err(SessionError::Timeout);
                }
                read_deadline = read_deadline.min(overall);
            }

            let payload = match sirf::read_frame(&mut *self.transport, read_deadline) {
                Ok(payload) => payload,
                Err(sirf::SirfError::Transport(TransportError::EndOfStream)) => {
                    return Err(SessionError::EndOfStream);
                }
                Err(sirf::SirfError::Transport(e)) => return Err(SessionError::Transport(e)),
                Err(e) => {
                    warn!("SIRF frame error ({e})");
                    continue;
                }
            };

            match messages::decode(&payload) {
                Ok(message) => return Ok(message),
                Err(sirf::SirfError::Unrecognized(id)) => {
                    debug!("Skipping unrecognized message {id}");
                }
                Err(e) => {
                    warn!("Undecodable message ({e}): {}", hex::encode(&payload));
                }
            }
        }
    }

    /// Iterate over recognized messages
    ///
    /// Yields until the recording ends or the cancel flag is set, both of
    /// which finish the iterator cleanly; hard faults come through as
    /// `Err` items.
    pub fn messages(&mut self) -> Messages<'_> {
        Messages { session: self }
    }

    /// Read messages until one of the given kind arrives, discarding the
    /// rest
    ///
    /// Intended for short request/response exchanges; bound the wait with
    /// `deadline`, since receiver silence blocks indefinitely otherwise.
    pub fn read_specific(
        &mut self,
        kind: MessageKind,
        deadline: Option<Instant>,
    ) -> Result<Message, SessionError> {
        loop {
            let message = self.read_message(deadline)?;
            if message.kind() == kind {
                return Ok(message);
            }
            debug!("Discarding message {} while waiting for {kind:?}", message.message_id());
        }
    }

    /// Frame and send a command to the receiver
    pub fn send(&mut self, command: &dyn SirfCommand) -> Result<(), SessionError> {
        self.require_sirf()?;
        debug!("Sending command {}", command.message_id());
        sirf::send_frame(&mut *self.transport, &command.to_bytes())?;
        Ok(())
    }

    /// Poll the firmware version and gate on the supported chip family
    ///
    /// The mixed-order float decoding is a GSW3 quirk; any other family
    /// gets a warning, not an error.
    pub fn poll_software_version(&mut self) -> Result<String, SessionError> {
        self.send(&PollSoftwareVersion)?;
        let deadline = Instant::now() + self.config.read_timeout;
        let message = self.read_specific(MessageKind::SoftwareVersion, Some(deadline))?;

        let version = match message {
            Message::SoftwareVersion(v) => v.version,
            _ => unreachable!("read_specific returned wrong kind"),
        };

        if !version.starts_with(SUPPORTED_VERSION_PREFIX) {
            warn!(
                "Firmware '{version}' is not in the {SUPPORTED_VERSION_PREFIX} family; \
                 decoded floating point fields may be wrong"
            );
        }
        info!("Receiver firmware: {version}");
        self.version = Some(version.clone());
        Ok(version)
    }

    /// Ask the receiver to emit message `target` every `rate` seconds
    /// (0 disables it)
    ///
    /// A no-op on a replay session: the recording already fixed what was
    /// emitted.
    pub fn set_message_rate(&mut self, target: u8, rate: u8) -> Result<(), SessionError> {
        if self.source == SourceKind::Replay {
            return Ok(());
        }
        self.send(&SetMessageRate::new(target, rate))
    }

    /// Switch from NMEA to the SIRF binary protocol
    pub fn nmea_to_sirf(&mut self) -> Result<(), SessionError> {
        let speed = self.config.sirf_speed;
        self.switch_to(LineSettings::sirf(speed))
    }

    /// Switch from SIRF binary back to NMEA
    pub fn sirf_to_nmea(&mut self) -> Result<(), SessionError> {
        let speed = self.config.nmea_speed;
        self.switch_to(LineSettings::nmea(speed))
    }

    /// Command the receiver over to `target` and verify it got there
    ///
    /// An exact match succeeds. A matching protocol at different line
    /// parameters is a degraded success: logged, adopted, not an error.
    /// A different protocol is fatal: the receiver ignored the command.
    pub fn switch_to(&mut self, target: LineSettings) -> Result<(), SessionError> {
        if self.source == SourceKind::Replay {
            return Err(SessionError::ReplaySession);
        }
        let current = self.mode.settings().ok_or(SessionError::ModeUnknown)?;
        if current == target {
            return Ok(());
        }

        debug!("Switching from {current} to {target}");
        match current.protocol {
            Protocol::Nmea => {
                let protocol_code = match target.protocol {
                    Protocol::Sirf => "0",
                    Protocol::Nmea => "1",
                };
                let parity_code = match target.params.parity {
                    Parity::None => "0",
                    Parity::Odd => "1",
                    Parity::Even => "2",
                };
                let baud = target.params.baud.to_string();
                let data_bits = target.params.data_bits.to_string();
                let stop_bits = target.params.stop_bits.to_string();
                nmea::send_sentence(
                    &mut *self.transport,
                    &[
                        "PSRF100",
                        protocol_code,
                        baud.as_str(),
                        data_bits.as_str(),
                        stop_bits.as_str(),
                        parity_code,
                    ],
                )?;
            }
            Protocol::Sirf => {
                self.send(&SwitchToNmeaProtocol::new(target.params.baud as u16))?;
            }
        }

        std::thread::sleep(self.config.settle_time);

        // The invariant "mode matches the line" is void until detection
        // confirms where the receiver landed.
        self.mode = Mode::Unknown;
        if self.transport.line_params() != target.params {
            self.transport.reconfigure(target.params)?;
        }

        let detected =
            self.detector
                .detect(&mut *self.transport, &[target], self.cancel.as_deref())?;
        self.mode = Mode::Detected(detected);
        self.log_status();

        if detected == target {
            Ok(())
        } else if detected.protocol == target.protocol {
            warn!("Switch landed on {detected} instead of {target}; keeping it");
            Ok(())
        } else {
            Err(SessionError::SwitchProtocolMismatch {
                requested: target,
                detected,
            })
        }
    }

    /// Dispatch messages to observers until the stream ends or the cancel
    /// flag is set
    ///
    /// The type→observer index is built once per call. `on_cycle` fires
    /// before the first message after an inter-frame gap longer than the
    /// configured threshold. This approximates the receiver's once-per-second
    /// batches; treat the boundaries as inexact.
    pub fn run(
        &mut self,
        observers: &mut [&mut dyn MessageObserver],
        mut on_cycle: Option<&mut dyn FnMut()>,
    ) -> Result<(), SessionError> {
        let mut index: HashMap<MessageKind, Vec<usize>> = HashMap::new();
        for (i, observer) in observers.iter().enumerate() {
            for kind in observer.observed_kinds() {
                index.entry(kind).or_default().push(i);
            }
        }

        let mut last_msg_time: Option<f64> = None;
        let mut cycles: u64 = 0;
        let mut last_status_cycle: u64 = 0;

        loop {
            let message = match self.read_message(None) {
                Ok(message) => message,
                Err(SessionError::EndOfStream) => {
                    info!("Recorded stream finished after {cycles} cycles");
                    return Ok(());
                }
                Err(SessionError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            };

            let arrival = self.transport.last_arrival();
            if let (Some(now), Some(last)) = (arrival, last_msg_time) {
                if now - last > self.config.cycle_gap.as_secs_f64() {
                    cycles += 1;
                    if let Some(callback) = on_cycle.as_mut() {
                        callback();
                    }
                }
            }
            last_msg_time = arrival;

            if self.config.status_interval > 0 {
                if let Message::MeasuredNavigation(nav) = &message {
                    if cycles - last_status_cycle >= u64::from(self.config.status_interval) {
                        info!(
                            "Fix: {} SVs, hdop {:.1}, tow {:.2}",
                            nav.sv_count, nav.hdop, nav.gps_tow
                        );
                        last_status_cycle = cycles;
                    }
                }
            }

            if let Some(interested) = index.get(&message.kind()) {
                for &i in interested {
                    observers[i].notify(&message);
                }
            }
        }
    }

    /// End the session leaving the receiver exactly where it is
    ///
    /// Suppresses the courtesy switch-back that [`Session::shutdown`] (and
    /// `Drop`) would perform; used when the point of the session was to put
    /// the receiver in a particular mode.
    pub fn close(&mut self) {
        self.closed = true;
        self.log_status();
    }

    /// End the session
    ///
    /// A live session left in SIRF mode is switched back to NMEA as a
    /// courtesy to whatever talks to the receiver next; failure to do so
    /// is logged, never raised.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.source == SourceKind::Live && self.mode.protocol() == Some(Protocol::Sirf) {
            if let Err(e) = self.sirf_to_nmea() {
                warn!("Could not switch back to NMEA on teardown: {e}");
            }
        }
        self.log_status();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Iterator over a session's recognized messages, created by
/// [`Session::messages`]
pub struct Messages<'a> {
    session: &'a mut Session,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message, SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.session.read_message(None) {
            Ok(message) => Some(Ok(message)),
            Err(SessionError::EndOfStream | SessionError::Cancelled) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::sirf::build_frame;

    fn sirf_stream(frames: &[(f64, Vec<u8>)]) -> ReplayTransport {
        let chunks: Vec<(f64, Vec<u8>)> = frames
            .iter()
            .map(|(t, payload)| (*t, build_frame(payload).unwrap()))
            .collect();
        ReplayTransport::new(chunks)
    }

    fn nav_payload() -> Vec<u8> {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&[0u8; 40]);
        payload
    }

    #[test]
    fn test_read_message_skips_unrecognized() {
        let transport = sirf_stream(&[
            (0.0, vec![0x99, 0x01]), // unrecognized
            (0.1, vec![11, 0x84]),   // command ack
        ]);
        let mut session = Session::replay(transport, SessionConfig::default());

        let message = session.read_message(None).unwrap();
        match message {
            Message::CommandAck(ack) => assert_eq!(ack.ack_id, 0x84),
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_read_message_ends_cleanly() {
        let transport = sirf_stream(&[(0.0, vec![0x99, 0x01])]);
        let mut session = Session::replay(transport, SessionConfig::default());

        match session.read_message(None) {
            Err(SessionError::EndOfStream) => {}
            other => panic!("expected end of stream, got {other:?}"),
        }
    }

    #[test]
    fn test_read_specific_discards_other_kinds() {
        let transport = sirf_stream(&[
            (0.0, nav_payload()),
            (0.1, vec![11, 0x01]),
            (0.2, vec![12, 0x02]),
        ]);
        let mut session = Session::replay(transport, SessionConfig::default());

        let message = session
            .read_specific(MessageKind::CommandNack, None)
            .unwrap();
        match message {
            Message::CommandNack(nack) => assert_eq!(nack.nack_id, 0x02),
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_switch_rejected_on_replay() {
        let transport = sirf_stream(&[]);
        let mut session = Session::replay(transport, SessionConfig::default());

        assert!(matches!(
            session.sirf_to_nmea(),
            Err(SessionError::ReplaySession)
        ));
    }

    struct CountingObserver {
        kinds: Vec<MessageKind>,
        seen: usize,
    }

    impl MessageObserver for CountingObserver {
        fn observed_kinds(&self) -> Vec<MessageKind> {
            self.kinds.clone()
        }

        fn notify(&mut self, _message: &Message) {
            self.seen += 1;
        }
    }

    #[test]
    fn test_run_dispatches_by_kind() {
        let transport = sirf_stream(&[
            (0.00, nav_payload()),
            (0.05, vec![11, 0x01]),
            (1.10, nav_payload()),
            (1.15, vec![11, 0x02]),
        ]);
        let mut session = Session::replay(transport, SessionConfig::default());

        let mut nav = CountingObserver {
            kinds: vec![MessageKind::MeasuredNavigation],
            seen: 0,
        };
        let mut acks = CountingObserver {
            kinds: vec![MessageKind::CommandAck],
            seen: 0,
        };

        let mut cycle_count = 0usize;
        {
            let mut observers: Vec<&mut dyn MessageObserver> = vec![&mut nav, &mut acks];
            let mut on_cycle = || cycle_count += 1;
            session
                .run(observers.as_mut_slice(), Some(&mut on_cycle))
                .unwrap();
        }

        assert_eq!(nav.seen, 2);
        assert_eq!(acks.seen, 2);
        // One gap (0.05 → 1.10) exceeds the threshold; boundaries within
        // the tight batches must not fire.
        assert_eq!(cycle_count, 1);
    }

    #[test]
    fn test_cancel_interrupts_run() {
        let transport = sirf_stream(&[(0.0, nav_payload())]);
        let mut session = Session::replay(transport, SessionConfig::default());

        let flag = Arc::new(AtomicBool::new(true));
        session.set_cancel_flag(flag);

        let mut observers: Vec<&mut dyn MessageObserver> = vec![];
        session.run(observers.as_mut_slice(), None).unwrap();
    }
}
