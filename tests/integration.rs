//! Integration tests for detection, mode switching and dispatch
//!
//! Driven by an instrumented scripted transport: it answers with
//! configured byte patterns only at specific line parameters and records
//! every reconfigure, flush and delimiter scan, so candidate probing order
//! is observable without hardware.

use sirfline_core::core::protocol::{nmea, sirf};
use sirfline_core::{
    DetectorConfig, Detector, LineParams, LineSettings, Message, MessageKind, MessageObserver,
    Mode, Protocol, ReplayTransport, Session, SessionConfig, SessionError, Transport,
    TransportError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Reconfigure(LineParams),
    FlushInput,
    ReadUntil(Vec<u8>),
}

/// A fake receiver that answers only at specific line parameters.
///
/// Each configured pattern repeats, but at most `max_fills` times between
/// input flushes; a probe that scans past that budget times out the way a
/// live line would.
struct ScriptedTransport {
    params: LineParams,
    patterns: Arc<Mutex<HashMap<LineParams, Vec<u8>>>>,
    max_fills: u32,
    fills_since_flush: u32,
    pending: Vec<u8>,
    events: Arc<Mutex<Vec<Event>>>,
    writes: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedTransport {
    fn new(initial: LineParams, patterns: HashMap<LineParams, Vec<u8>>) -> Self {
        Self {
            params: initial,
            patterns: Arc::new(Mutex::new(patterns)),
            max_fills: 4,
            fills_since_flush: 0,
            pending: Vec::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn events_handle(&self) -> Arc<Mutex<Vec<Event>>> {
        self.events.clone()
    }

    fn writes_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        self.writes.clone()
    }

    fn patterns_handle(&self) -> Arc<Mutex<HashMap<LineParams, Vec<u8>>>> {
        self.patterns.clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        if self.fills_since_flush >= self.max_fills {
            return Err(TransportError::TimedOut);
        }
        let patterns = self.patterns.lock().unwrap();
        let pattern = patterns.get(&self.params).ok_or(TransportError::TimedOut)?;
        self.pending.extend_from_slice(pattern);
        self.fills_since_flush += 1;
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn read_exact(&mut self, count: usize, _deadline: Instant) -> Result<Vec<u8>, TransportError> {
        while self.pending.len() < count {
            self.fill()?;
        }
        let rest = self.pending.split_off(count);
        let out = std::mem::replace(&mut self.pending, rest);
        Ok(out)
    }

    fn read_until(
        &mut self,
        delimiter: &[u8],
        _deadline: Instant,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(Event::ReadUntil(delimiter.to_vec()));
        loop {
            if let Some(pos) = self
                .pending
                .windows(delimiter.len())
                .position(|w| w == delimiter)
            {
                let rest = self.pending.split_off(pos + delimiter.len());
                let out = std::mem::replace(&mut self.pending, rest);
                return Ok(out);
            }
            self.fill()?;
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writes.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.record(Event::FlushInput);
        self.pending.clear();
        self.fills_since_flush = 0;
        Ok(())
    }

    fn reconfigure(&mut self, params: LineParams) -> Result<(), TransportError> {
        self.record(Event::Reconfigure(params));
        self.pending.clear();
        self.params = params;
        Ok(())
    }

    fn line_params(&self) -> LineParams {
        self.params
    }

    fn last_arrival(&self) -> Option<f64> {
        None
    }

    fn connection_info(&self) -> String {
        format!("scripted @ {}", self.params)
    }
}

fn nmea_pattern() -> Vec<u8> {
    nmea::build_sentence(&["GPGGA", "123519", "4807.038", "N", "01131.000", "E", "1", "08"])
        .unwrap()
}

fn sirf_pattern() -> Vec<u8> {
    sirf::build_frame(&[0x02, 0x01, 0x02, 0x03]).unwrap()
}

fn fast_detector() -> DetectorConfig {
    DetectorConfig {
        probe_timeout: Duration::from_millis(50),
        retry_count: 2,
    }
}

#[test]
fn detect_probes_candidates_in_order() {
    // The receiver answers only at the third expected candidate; the two
    // earlier ones must be probed first, and with their own codecs.
    let mut patterns = HashMap::new();
    patterns.insert(LineParams::new(9600), sirf_pattern());

    let mut transport = ScriptedTransport::new(LineParams::new(1200), patterns);
    let events = transport.events_handle();

    let expected = [
        LineSettings::nmea(4800),
        LineSettings::sirf(4800),
        LineSettings::sirf(9600),
    ];
    let detector = Detector::new(fast_detector());
    let detected = detector.detect(&mut transport, &expected, None).unwrap();
    assert_eq!(detected, LineSettings::sirf(9600));

    let events = events.lock().unwrap();

    let reconfigures: Vec<LineParams> = events
        .iter()
        .filter_map(|e| match e {
            Event::Reconfigure(p) => Some(*p),
            _ => None,
        })
        .collect();
    // 4800 is shared by the first two candidates, so the line is touched
    // only when parameters change.
    assert_eq!(
        reconfigures,
        vec![LineParams::new(4800), LineParams::new(9600)]
    );

    let scans: Vec<Vec<u8>> = events
        .iter()
        .filter_map(|e| match e {
            Event::ReadUntil(d) => Some(d.clone()),
            _ => None,
        })
        .collect();
    // Two timed-out NMEA probes, two timed-out SIRF probes, one SIRF hit.
    assert_eq!(
        scans,
        vec![
            b"$".to_vec(),
            b"$".to_vec(),
            vec![0xA0, 0xA2],
            vec![0xA0, 0xA2],
            vec![0xA0, 0xA2],
        ]
    );
}

#[test]
fn detect_falls_back_to_exhaustive_scan() {
    // Answers only at 7E2/38400 NMEA, which no expected candidate names.
    let odd_params = LineParams::new(38400)
        .data_bits(7)
        .parity(sirfline_core::Parity::Even)
        .stop_bits(2);
    let mut patterns = HashMap::new();
    patterns.insert(odd_params, nmea_pattern());

    let mut transport = ScriptedTransport::new(LineParams::new(4800), patterns);

    let detector = Detector::new(fast_detector());
    let detected = detector
        .detect(&mut transport, &[LineSettings::nmea(4800)], None)
        .unwrap();

    assert_eq!(detected.protocol, Protocol::Nmea);
    assert_eq!(detected.params, odd_params);
}

#[test]
fn detect_exhaustion_is_fatal() {
    let mut transport = ScriptedTransport::new(LineParams::new(4800), HashMap::new());

    let detector = Detector::new(fast_detector());
    let result = detector.detect(&mut transport, &[LineSettings::nmea(4800)], None);
    assert!(matches!(
        result,
        Err(sirfline_core::DetectError::ModeNotDetected)
    ));
}

fn quick_session_config() -> SessionConfig {
    SessionConfig {
        settle_time: Duration::from_millis(1),
        read_timeout: Duration::from_millis(50),
        detector: fast_detector(),
        ..SessionConfig::default()
    }
}

#[test]
fn switch_to_wrong_protocol_is_fatal() {
    // The receiver ignores the switch command and keeps talking NMEA.
    let mut patterns = HashMap::new();
    patterns.insert(LineParams::new(4800), nmea_pattern());
    patterns.insert(LineParams::new(19200), nmea_pattern());

    let transport = ScriptedTransport::new(LineParams::new(4800), patterns);
    let writes = transport.writes_handle();

    let config = SessionConfig {
        expected: vec![LineSettings::nmea(4800)],
        ..quick_session_config()
    };
    let mut session = Session::open(Box::new(transport), config).unwrap();
    assert_eq!(session.mode(), Mode::Detected(LineSettings::nmea(4800)));

    let result = session.switch_to(LineSettings::sirf(19200));
    match result {
        Err(SessionError::SwitchProtocolMismatch {
            requested,
            detected,
        }) => {
            assert_eq!(requested, LineSettings::sirf(19200));
            assert_eq!(detected.protocol, Protocol::Nmea);
        }
        other => panic!("expected protocol mismatch, got {other:?}"),
    }

    // The mode still reflects where the receiver actually is.
    assert_eq!(session.mode().protocol(), Some(Protocol::Nmea));

    // The switch command went out as a PSRF100 sentence.
    let writes = writes.lock().unwrap();
    let sent = String::from_utf8_lossy(&writes);
    assert!(
        sent.starts_with("$PSRF100,0,19200,8,1,0*"),
        "unexpected switch command: {sent}"
    );

    session.close();
}

#[test]
fn switch_adopts_degraded_settings_on_same_protocol() {
    // The receiver honors the protocol switch but comes up at 9600 baud
    // instead of the requested 19200.
    let mut patterns = HashMap::new();
    patterns.insert(LineParams::new(4800), nmea_pattern());

    let transport = ScriptedTransport::new(LineParams::new(4800), patterns);
    let patterns = transport.patterns_handle();

    let config = SessionConfig {
        expected: vec![LineSettings::nmea(4800)],
        ..quick_session_config()
    };
    let mut session = Session::open(Box::new(transport), config).unwrap();

    // After the switch command the fake receiver stops talking NMEA and
    // starts emitting SIRF frames, at the wrong baud rate.
    {
        let mut patterns = patterns.lock().unwrap();
        patterns.clear();
        patterns.insert(LineParams::new(9600), sirf_pattern());
    }

    session.switch_to(LineSettings::sirf(19200)).unwrap();
    assert_eq!(session.mode(), Mode::Detected(LineSettings::sirf(9600)));

    session.close();
}

struct SvStateCollector {
    prns: Vec<u8>,
}

impl MessageObserver for SvStateCollector {
    fn observed_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::NavLibSvState]
    }

    fn notify(&mut self, message: &Message) {
        if let Message::NavLibSvState(sv) = message {
            self.prns.push(sv.satellite_id);
        }
    }
}

fn sv_state_payload(prn: u8) -> Vec<u8> {
    let mut payload = vec![30u8, prn];
    payload.extend_from_slice(&[0u8; 81]);
    payload
}

#[test]
fn replay_dispatch_with_cycle_boundaries() {
    // Two measurement batches a second apart, with an unrecognized message
    // mixed in; the observer sees the SV states, the cycle callback fires
    // once between the batches, and the stream end is clean.
    let frames = vec![
        (10.00, sv_state_payload(3)),
        (10.05, vec![0x99, 0x00]),
        (10.10, sv_state_payload(14)),
        (11.10, sv_state_payload(3)),
        (11.20, sv_state_payload(14)),
    ];
    let chunks: Vec<(f64, Vec<u8>)> = frames
        .into_iter()
        .map(|(t, payload)| (t, sirf::build_frame(&payload).unwrap()))
        .collect();

    let mut session = Session::replay(ReplayTransport::new(chunks), SessionConfig::default());

    let mut collector = SvStateCollector { prns: Vec::new() };
    let mut boundaries = 0usize;
    {
        let mut observers: Vec<&mut dyn MessageObserver> = vec![&mut collector];
        let mut on_cycle = || boundaries += 1;
        session
            .run(observers.as_mut_slice(), Some(&mut on_cycle))
            .unwrap();
    }

    assert_eq!(collector.prns, vec![3, 14, 3, 14]);
    assert_eq!(boundaries, 1);
}

#[test]
fn nmea_round_trip_through_a_transport() {
    let mut patterns = HashMap::new();
    patterns.insert(LineParams::new(4800), Vec::new());
    let mut transport = ScriptedTransport::new(LineParams::new(4800), patterns);
    let writes = transport.writes_handle();

    nmea::send_sentence(&mut transport, &["PSRF100", "0", "19200", "8", "1", "0"]).unwrap();

    let captured = writes.lock().unwrap().clone();
    let mut replay = ReplayTransport::new(vec![(0.0, captured)]);
    let fields = nmea::read_sentence(
        &mut replay,
        Instant::now() + Duration::from_secs(1),
    )
    .unwrap();

    assert_eq!(fields, vec!["PSRF100", "0", "19200", "8", "1", "0"]);
}
