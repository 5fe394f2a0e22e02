//! Typed SiRF messages and the decode registry
//!
//! Only a curated subset of the receiver's output is decoded; everything
//! else surfaces as [`SirfError::Unrecognized`], which dispatch loops skip.
//! The registry is a static table keyed by the one-byte message id; a unit
//! test verifies id uniqueness.
//!
//! Scale factors and bit layouts follow the GSW3 firmware documentation:
//! velocities arrive in eighths of m/s, HDOP in fifths, times in
//! hundredths or thousandths of a second, geodetic angles in 1e-7 degrees.

use super::sirf::{sirf_double, sirf_single, SirfError};

/// Decoder function stored in the registry
pub type DecodeFn = fn(&[u8]) -> Result<Message, SirfError>;

/// Static decode registry: `(message_id, decoder)`, one entry per known
/// received type
pub const DECODERS: &[(u8, DecodeFn)] = &[
    (MeasuredNavigationData::ID, MeasuredNavigationData::decode),
    (SoftwareVersion::ID, SoftwareVersion::decode),
    (ClockStatusData::ID, ClockStatusData::decode),
    (CommandAck::ID, CommandAck::decode),
    (CommandNack::ID, CommandNack::decode),
    (NavLibMeasurementData::ID, NavLibMeasurementData::decode),
    (NavLibSvStateData::ID, NavLibSvStateData::decode),
    (GeodeticNavigationData::ID, GeodeticNavigationData::decode),
    (SbasParameters::ID, SbasParameters::decode),
];

/// Decode a frame payload into a typed message
///
/// The leading payload byte selects the decoder. An id with no registry
/// entry fails with [`SirfError::Unrecognized`], which is expected and
/// frequent rather than a protocol violation.
pub fn decode(payload: &[u8]) -> Result<Message, SirfError> {
    let id = *payload.first().ok_or(SirfError::Length { id: 0, len: 0 })?;
    match DECODERS.iter().find(|(entry_id, _)| *entry_id == id) {
        Some((_, decoder)) => decoder(payload),
        None => Err(SirfError::Unrecognized(id)),
    }
}

/// A decoded receiver message
#[derive(Debug, Clone)]
pub enum Message {
    /// Measure navigation data out (id 2)
    MeasuredNavigation(MeasuredNavigationData),
    /// Software version string (id 6)
    SoftwareVersion(SoftwareVersion),
    /// Clock status data (id 7)
    ClockStatus(ClockStatusData),
    /// Command acknowledgment (id 11)
    CommandAck(CommandAck),
    /// Command negative acknowledgment (id 12)
    CommandNack(CommandNack),
    /// Navigation library measurement data (id 28)
    NavLibMeasurement(NavLibMeasurementData),
    /// Navigation library SV state data (id 30)
    NavLibSvState(NavLibSvStateData),
    /// Geodetic navigation data (id 41)
    GeodeticNavigation(GeodeticNavigationData),
    /// SBAS parameters (id 50)
    SbasParameters(SbasParameters),
}

impl Message {
    /// Kind tag of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::MeasuredNavigation(_) => MessageKind::MeasuredNavigation,
            Self::SoftwareVersion(_) => MessageKind::SoftwareVersion,
            Self::ClockStatus(_) => MessageKind::ClockStatus,
            Self::CommandAck(_) => MessageKind::CommandAck,
            Self::CommandNack(_) => MessageKind::CommandNack,
            Self::NavLibMeasurement(_) => MessageKind::NavLibMeasurement,
            Self::NavLibSvState(_) => MessageKind::NavLibSvState,
            Self::GeodeticNavigation(_) => MessageKind::GeodeticNavigation,
            Self::SbasParameters(_) => MessageKind::SbasParameters,
        }
    }

    /// Wire message id
    pub fn message_id(&self) -> u8 {
        self.kind().message_id()
    }
}

/// Identity of a received message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Measure navigation data out (id 2)
    MeasuredNavigation,
    /// Software version string (id 6)
    SoftwareVersion,
    /// Clock status data (id 7)
    ClockStatus,
    /// Command acknowledgment (id 11)
    CommandAck,
    /// Command negative acknowledgment (id 12)
    CommandNack,
    /// Navigation library measurement data (id 28)
    NavLibMeasurement,
    /// Navigation library SV state data (id 30)
    NavLibSvState,
    /// Geodetic navigation data (id 41)
    GeodeticNavigation,
    /// SBAS parameters (id 50)
    SbasParameters,
}

impl MessageKind {
    /// Wire message id of this kind
    pub fn message_id(self) -> u8 {
        match self {
            Self::MeasuredNavigation => MeasuredNavigationData::ID,
            Self::SoftwareVersion => SoftwareVersion::ID,
            Self::ClockStatus => ClockStatusData::ID,
            Self::CommandAck => CommandAck::ID,
            Self::CommandNack => CommandNack::ID,
            Self::NavLibMeasurement => NavLibMeasurementData::ID,
            Self::NavLibSvState => NavLibSvStateData::ID,
            Self::GeodeticNavigation => GeodeticNavigationData::ID,
            Self::SbasParameters => SbasParameters::ID,
        }
    }
}

/// Big-endian cursor over a message payload
///
/// Every accessor fails with a single `Length` error naming the message id
/// when the payload runs short, so decoders stay free of index arithmetic.
struct FieldReader<'a> {
    id: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(id: u8, data: &'a [u8]) -> Self {
        Self { id, data, pos: 0 }
    }

    fn short(&self) -> SirfError {
        SirfError::Length {
            id: self.id,
            len: self.data.len(),
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], SirfError> {
        if self.pos + count > self.data.len() {
            return Err(self.short());
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn skip(&mut self, count: usize) -> Result<(), SirfError> {
        self.take(count).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, SirfError> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8, SirfError> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16, SirfError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, SirfError> {
        Ok(self.u16()? as i16)
    }

    fn u32(&mut self) -> Result<u32, SirfError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, SirfError> {
        Ok(self.u32()? as i32)
    }

    fn double(&mut self) -> Result<f64, SirfError> {
        let b = self.take(8)?;
        let mut field = [0u8; 8];
        field.copy_from_slice(b);
        Ok(sirf_double(&field))
    }

    fn single(&mut self) -> Result<f32, SirfError> {
        let b = self.take(4)?;
        let mut field = [0u8; 4];
        field.copy_from_slice(b);
        Ok(sirf_single(&field))
    }
}

/// Measure navigation data out: ECEF position/velocity fix (id 2)
#[derive(Debug, Clone)]
pub struct MeasuredNavigationData {
    /// ECEF position in meters
    pub pos: [f64; 3],
    /// ECEF velocity in m/s (wire carries eighths)
    pub velocity: [f64; 3],
    /// DGPS corrections applied
    pub dgps: bool,
    /// Solution suppressed by DOP mask
    pub dop_mask: bool,
    /// Altitude hold mode (2 bits)
    pub alt_mode: u8,
    /// Trickle-power mode active
    pub tp_mode: bool,
    /// Position fix mode (3 bits)
    pub position_mode: u8,
    /// Horizontal dilution of precision (wire carries fifths)
    pub hdop: f32,
    /// Dead-reckoning error status (2 bits)
    pub dr_error: u8,
    /// Altitude hold engaged
    pub alt_hold: bool,
    /// Velocity solution invalid
    pub velocity_invalid: bool,
    /// Solution was edited
    pub solution_edited: bool,
    /// Velocity dead-reckoning timeout exceeded
    pub velocity_dr_timeout: bool,
    /// Solution validated
    pub solution_validated: bool,
    /// Sensor dead reckoning used
    pub sensor_dr_used: bool,
    /// GPS week number
    pub gps_week: u16,
    /// GPS time of week in seconds (wire carries hundredths)
    pub gps_tow: f64,
    /// Number of SVs in the fix
    pub sv_count: u8,
    /// PRN tracked on each of the 12 channels (0 = idle)
    pub channel_prns: [u8; 12],
}

impl MeasuredNavigationData {
    /// Wire message id
    pub const ID: u8 = 2;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;

        let pos = [r.i32()? as f64, r.i32()? as f64, r.i32()? as f64];
        let velocity = [
            f64::from(r.i16()?) / 8.0,
            f64::from(r.i16()?) / 8.0,
            f64::from(r.i16()?) / 8.0,
        ];

        let mode1 = r.u8()?;
        let hdop = f32::from(r.u8()?) / 5.0;
        let mode2 = r.u8()?;
        let gps_week = r.u16()?;
        let gps_tow = f64::from(r.u32()?) / 100.0;
        let sv_count = r.u8()?;
        let mut channel_prns = [0u8; 12];
        for prn in &mut channel_prns {
            *prn = r.u8()?;
        }

        Ok(Message::MeasuredNavigation(Self {
            pos,
            velocity,
            dgps: mode1 & 0x80 != 0,
            dop_mask: mode1 & 0x40 != 0,
            alt_mode: (mode1 & 0x30) >> 4,
            tp_mode: mode1 & 0x08 != 0,
            position_mode: mode1 & 0x07,
            hdop,
            dr_error: mode2 & 0xC0,
            alt_hold: mode2 & 0x20 != 0,
            velocity_invalid: mode2 & 0x10 != 0,
            solution_edited: mode2 & 0x08 != 0,
            velocity_dr_timeout: mode2 & 0x04 != 0,
            solution_validated: mode2 & 0x02 != 0,
            sensor_dr_used: mode2 & 0x01 != 0,
            gps_week,
            gps_tow,
            sv_count,
            channel_prns,
        }))
    }
}

/// Software version string, the response to [`PollSoftwareVersion`] (id 6)
#[derive(Debug, Clone)]
pub struct SoftwareVersion {
    /// Firmware version string, e.g. `GSW3.2.4_3.1.00.12-SDK003P1.00a`
    pub version: String,
}

impl SoftwareVersion {
    /// Wire message id
    pub const ID: u8 = 6;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        if payload.is_empty() {
            return Err(SirfError::Length { id: Self::ID, len: 0 });
        }
        let version = String::from_utf8_lossy(&payload[1..])
            .trim_end_matches('\0')
            .trim()
            .to_string();
        Ok(Message::SoftwareVersion(Self { version }))
    }
}

/// Clock status data (id 7)
#[derive(Debug, Clone)]
pub struct ClockStatusData {
    /// Extended GPS week number
    pub extended_gps_week: u16,
    /// GPS time of week in seconds (wire carries hundredths)
    pub gps_tow: f64,
    /// Number of SVs used
    pub sv_count: u8,
    /// Clock drift in Hz
    pub clock_drift: u32,
    /// Clock bias in nanoseconds
    pub clock_bias: u32,
    /// Estimated GPS time in milliseconds
    pub estimated_gps_time: u32,
}

impl ClockStatusData {
    /// Wire message id
    pub const ID: u8 = 7;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;
        Ok(Message::ClockStatus(Self {
            extended_gps_week: r.u16()?,
            gps_tow: f64::from(r.u32()?) / 100.0,
            sv_count: r.u8()?,
            clock_drift: r.u32()?,
            clock_bias: r.u32()?,
            estimated_gps_time: r.u32()?,
        }))
    }
}

/// Command acknowledgment (id 11)
#[derive(Debug, Clone)]
pub struct CommandAck {
    /// Id of the acknowledged command
    pub ack_id: u8,
}

impl CommandAck {
    /// Wire message id
    pub const ID: u8 = 11;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;
        Ok(Message::CommandAck(Self { ack_id: r.u8()? }))
    }
}

/// Command negative acknowledgment (id 12)
#[derive(Debug, Clone)]
pub struct CommandNack {
    /// Id of the rejected command
    pub nack_id: u8,
}

impl CommandNack {
    /// Wire message id
    pub const ID: u8 = 12;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;
        Ok(Message::CommandNack(Self { nack_id: r.u8()? }))
    }
}

/// Navigation library measurement data: raw pseudorange/carrier per
/// channel (id 28)
#[derive(Debug, Clone)]
pub struct NavLibMeasurementData {
    /// Receiver channel
    pub channel: u8,
    /// Measurement time tag
    pub time_tag: u32,
    /// Satellite PRN
    pub satellite_id: u8,
    /// GPS software time in seconds
    pub gps_sw_time: f64,
    /// Pseudorange in meters
    pub pseudorange: f64,
    /// Carrier frequency in m/s
    pub carrier_freq: f32,
    /// Carrier phase in meters
    pub carrier_phase: f64,
    /// Time in track in milliseconds
    pub time_in_track: u16,
    /// Sync flags bit field
    pub sync_flags: u8,
    /// C/N0 for each 100 ms interval, dB-Hz
    pub cn0: [u8; 10],
    /// Delta range interval in milliseconds
    pub delta_range_interval: u16,
    /// Mean delta range measurement time in milliseconds
    pub mean_delta_range_time: u16,
    /// Extrapolation time in milliseconds
    pub extrapolation_time: i16,
    /// Phase error count
    pub phase_error_count: u8,
    /// Low power measurement count
    pub low_power_count: u8,
}

impl NavLibMeasurementData {
    /// Wire message id
    pub const ID: u8 = 28;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;

        let channel = r.u8()?;
        let time_tag = r.u32()?;
        let satellite_id = r.u8()?;
        let gps_sw_time = r.double()?;
        let pseudorange = r.double()?;
        let carrier_freq = r.single()?;
        let carrier_phase = r.double()?;
        let time_in_track = r.u16()?;
        let sync_flags = r.u8()?;
        let mut cn0 = [0u8; 10];
        for slot in &mut cn0 {
            *slot = r.u8()?;
        }

        Ok(Message::NavLibMeasurement(Self {
            channel,
            time_tag,
            satellite_id,
            gps_sw_time,
            pseudorange,
            carrier_freq,
            carrier_phase,
            time_in_track,
            sync_flags,
            cn0,
            delta_range_interval: r.u16()?,
            mean_delta_range_time: r.u16()?,
            extrapolation_time: r.i16()?,
            phase_error_count: r.u8()?,
            low_power_count: r.u8()?,
        }))
    }
}

/// Navigation library SV state data: satellite positions and speeds (id 30)
#[derive(Debug, Clone)]
pub struct NavLibSvStateData {
    /// Satellite PRN
    pub satellite_id: u8,
    /// GPS time of the state in seconds
    pub gps_time: f64,
    /// ECEF satellite position in meters
    pub pos: [f64; 3],
    /// ECEF satellite velocity in m/s
    pub velocity: [f64; 3],
    /// Satellite clock bias in seconds
    pub clock_bias: f64,
    /// Satellite clock drift in s/s
    pub clock_drift: f32,
    /// Ephemeris flags
    pub ephemeris_flags: u8,
    /// Ionospheric delay in meters
    pub iono_delay: f32,
}

impl NavLibSvStateData {
    /// Wire message id
    pub const ID: u8 = 30;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;

        let satellite_id = r.u8()?;
        let gps_time = r.double()?;
        let pos = [r.double()?, r.double()?, r.double()?];
        let velocity = [r.double()?, r.double()?, r.double()?];
        let clock_bias = r.double()?;
        let clock_drift = r.single()?;
        let ephemeris_flags = r.u8()?;
        r.skip(8)?;
        let iono_delay = r.single()?;

        Ok(Message::NavLibSvState(Self {
            satellite_id,
            gps_time,
            pos,
            velocity,
            clock_bias,
            clock_drift,
            ephemeris_flags,
            iono_delay,
        }))
    }
}

/// Geodetic navigation data: the full WGS84 fix (id 41)
#[derive(Debug, Clone)]
pub struct GeodeticNavigationData {
    /// Navigation validity bit field (0 = valid)
    pub nav_valid: u16,
    /// Navigation type bit field
    pub nav_type: u16,
    /// Extended GPS week number
    pub extended_gps_week: u16,
    /// GPS time of week in seconds (wire carries thousandths)
    pub gps_tow: f64,
    /// UTC year
    pub utc_year: u16,
    /// UTC month
    pub utc_month: u8,
    /// UTC day
    pub utc_day: u8,
    /// UTC hour
    pub utc_hour: u8,
    /// UTC minute
    pub utc_minute: u8,
    /// UTC second (wire carries thousandths)
    pub utc_second: f64,
    /// Bit mask of SV ids used in the fix
    pub sat_id_mask: u32,
    /// Latitude in degrees (wire carries 1e-7 degrees)
    pub latitude: f64,
    /// Longitude in degrees (wire carries 1e-7 degrees)
    pub longitude: f64,
    /// Altitude above the ellipsoid in meters (wire carries centimeters)
    pub altitude_ellipsoid: f64,
    /// Altitude above mean sea level in meters (wire carries centimeters)
    pub altitude_msl: f64,
    /// Map datum id
    pub map_datum: i8,
    /// Speed over ground in m/s (wire carries centimeters/s)
    pub speed_over_ground: f64,
    /// Course over ground in degrees (wire carries hundredths)
    pub course_over_ground: f64,
    /// Climb rate in m/s (wire carries centimeters/s)
    pub climb_rate: f64,
    /// Heading rate in deg/s (wire carries hundredths)
    pub heading_rate: f64,
    /// Estimated horizontal position error in meters
    pub ehpe: f64,
    /// Estimated vertical position error in meters
    pub evpe: f64,
    /// Estimated time error in seconds
    pub ete: f64,
    /// Estimated horizontal velocity error in m/s
    pub ehve: f64,
    /// Clock bias in meters
    pub clock_bias: f64,
    /// Clock bias error in meters
    pub clock_bias_error: f64,
    /// Clock drift in m/s
    pub clock_drift: f64,
    /// Clock drift error in m/s
    pub clock_drift_error: f64,
    /// Distance traveled since reset in meters
    pub distance: u32,
    /// Distance error
    pub distance_error: u16,
    /// Heading error
    pub heading_error: u16,
    /// Horizontal dilution of precision (wire carries fifths)
    pub hdop: f32,
    /// Additional mode info bit field
    pub additional_mode_info: u8,
}

impl GeodeticNavigationData {
    /// Wire message id
    pub const ID: u8 = 41;

    /// SV ids present in the fix, decoded from the bit mask
    pub fn sat_ids(&self) -> Vec<u8> {
        (0..32).filter(|bit| self.sat_id_mask & (1 << bit) != 0).collect()
    }

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;

        let nav_valid = r.u16()?;
        let nav_type = r.u16()?;
        let extended_gps_week = r.u16()?;
        let gps_tow = f64::from(r.u32()?) / 1e3;
        let utc_year = r.u16()?;
        let utc_month = r.u8()?;
        let utc_day = r.u8()?;
        let utc_hour = r.u8()?;
        let utc_minute = r.u8()?;
        let utc_second = f64::from(r.u16()?) / 1e3;
        let sat_id_mask = r.u32()?;
        let latitude = f64::from(r.i32()?) / 1e7;
        let longitude = f64::from(r.i32()?) / 1e7;
        let altitude_ellipsoid = f64::from(r.i32()?) / 1e2;
        let altitude_msl = f64::from(r.i32()?) / 1e2;
        let map_datum = r.i8()?;
        let speed_over_ground = f64::from(r.u16()?) / 1e2;
        let course_over_ground = f64::from(r.u16()?) / 1e2;
        r.skip(2)?; // magnetic variation, reserved
        let climb_rate = f64::from(r.i16()?) / 1e2;
        let heading_rate = f64::from(r.i16()?) / 1e2;
        let ehpe = f64::from(r.u32()?) / 1e2;
        let evpe = f64::from(r.u32()?) / 1e2;
        let ete = f64::from(r.u32()?) / 1e2;
        let ehve = f64::from(r.u16()?) / 1e2;
        let clock_bias = f64::from(r.i32()?) / 1e2;
        let clock_bias_error = f64::from(r.u32()?) / 1e2;
        let clock_drift = f64::from(r.i32()?) / 1e2;
        let clock_drift_error = f64::from(r.u32()?) / 1e2;
        let distance = r.u32()?;
        let distance_error = r.u16()?;
        let heading_error = r.u16()?;
        r.skip(1)?; // SVs in fix duplicate
        let hdop = f32::from(r.u8()?) / 5.0;
        let additional_mode_info = r.u8()?;

        Ok(Message::GeodeticNavigation(Self {
            nav_valid,
            nav_type,
            extended_gps_week,
            gps_tow,
            utc_year,
            utc_month,
            utc_day,
            utc_hour,
            utc_minute,
            utc_second,
            sat_id_mask,
            latitude,
            longitude,
            altitude_ellipsoid,
            altitude_msl,
            map_datum,
            speed_over_ground,
            course_over_ground,
            climb_rate,
            heading_rate,
            ehpe,
            evpe,
            ete,
            ehve,
            clock_bias,
            clock_bias_error,
            clock_drift,
            clock_drift_error,
            distance,
            distance_error,
            heading_error,
            hdop,
            additional_mode_info,
        }))
    }
}

/// SBAS parameters (id 50)
#[derive(Debug, Clone)]
pub struct SbasParameters {
    /// SBAS PRN in use
    pub sbas_prn: u8,
    /// SBAS mode
    pub sbas_mode: u8,
    /// DGPS timeout in seconds
    pub dgps_timeout: u8,
    /// Timeout set by the user rather than the default
    pub user_timeout: bool,
    /// SBAS satellite reported unhealthy
    pub unhealthy: bool,
    /// SBAS corrections active
    pub corrections: bool,
    /// PRN chosen by the user rather than the default
    pub user_prn: bool,
}

impl SbasParameters {
    /// Wire message id
    pub const ID: u8 = 50;

    fn decode(payload: &[u8]) -> Result<Message, SirfError> {
        let mut r = FieldReader::new(Self::ID, payload);
        r.skip(1)?;

        let sbas_prn = r.u8()?;
        let sbas_mode = r.u8()?;
        let dgps_timeout = r.u8()?;
        let flags = r.u8()?;

        Ok(Message::SbasParameters(Self {
            sbas_prn,
            sbas_mode,
            dgps_timeout,
            user_timeout: flags & 0x01 != 0,
            unhealthy: flags & 0x02 != 0,
            corrections: flags & 0x04 != 0,
            user_prn: flags & 0x08 != 0,
        }))
    }
}

/// A command that can be framed and sent to the receiver
pub trait SirfCommand {
    /// Wire message id of the command
    fn message_id(&self) -> u8;

    /// Payload bytes, including the leading id byte
    fn to_bytes(&self) -> Vec<u8>;
}

/// Rate setting for one NMEA sentence in [`SwitchToNmeaProtocol`]
#[derive(Debug, Clone, Copy)]
pub struct SentenceRate {
    /// Emission period in seconds, 0 = disabled
    pub period: u8,
    /// Emit the sentence with a checksum
    pub checksum: bool,
}

impl SentenceRate {
    /// Emit every `period` seconds, with checksum
    pub fn every(period: u8) -> Self {
        Self {
            period,
            checksum: true,
        }
    }

    /// Sentence disabled
    pub fn off() -> Self {
        Self {
            period: 0,
            checksum: true,
        }
    }
}

/// Switch the receiver to the NMEA protocol (id 129)
///
/// Defaults for the per-sentence rates are the ones GPSD uses.
#[derive(Debug, Clone)]
pub struct SwitchToNmeaProtocol {
    /// Debug message setting (2 = leave unchanged)
    pub mode: u8,
    /// GGA rate
    pub gga: SentenceRate,
    /// GLL rate
    pub gll: SentenceRate,
    /// GSA rate
    pub gsa: SentenceRate,
    /// GSV rate
    pub gsv: SentenceRate,
    /// RMC rate
    pub rmc: SentenceRate,
    /// VTG rate
    pub vtg: SentenceRate,
    /// MSS rate
    pub mss: SentenceRate,
    /// EPE rate
    pub epe: SentenceRate,
    /// ZDA rate
    pub zda: SentenceRate,
    /// Baud rate the receiver switches to
    pub speed: u16,
}

impl SwitchToNmeaProtocol {
    /// Wire message id
    pub const ID: u8 = 129;

    /// Switch to NMEA at the given baud rate, default sentence mask
    pub fn new(speed: u16) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }
}

impl Default for SwitchToNmeaProtocol {
    fn default() -> Self {
        Self {
            mode: 2,
            gga: SentenceRate::every(1),
            gll: SentenceRate::off(),
            gsa: SentenceRate::every(1),
            gsv: SentenceRate::every(5),
            rmc: SentenceRate::every(1),
            vtg: SentenceRate::off(),
            mss: SentenceRate::off(),
            epe: SentenceRate::off(),
            zda: SentenceRate::off(),
            speed: 4800,
        }
    }
}

impl SirfCommand for SwitchToNmeaProtocol {
    fn message_id(&self) -> u8 {
        Self::ID
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        out.push(Self::ID);
        out.push(self.mode);
        for rate in [
            self.gga, self.gll, self.gsa, self.gsv, self.rmc, self.vtg, self.mss, self.epe,
            self.zda,
        ] {
            out.push(rate.period);
            out.push(u8::from(rate.checksum));
        }
        out.extend_from_slice(&[0, 0]); // reserved
        out.extend_from_slice(&self.speed.to_be_bytes());
        out
    }
}

/// Poll the firmware version string (id 132); the receiver answers with
/// [`SoftwareVersion`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PollSoftwareVersion;

impl PollSoftwareVersion {
    /// Wire message id
    pub const ID: u8 = 132;
}

impl SirfCommand for PollSoftwareVersion {
    fn message_id(&self) -> u8 {
        Self::ID
    }

    fn to_bytes(&self) -> Vec<u8> {
        vec![Self::ID, 0]
    }
}

/// Set how often a message type is emitted (id 166)
#[derive(Debug, Clone, Copy)]
pub struct SetMessageRate {
    /// Rate mode (see the associated constants)
    pub mode: u8,
    /// Target message id
    pub target: u8,
    /// Emission period in seconds, 0 = disabled
    pub update_rate: u8,
}

impl SetMessageRate {
    /// Wire message id
    pub const ID: u8 = 166;

    /// Apply to the one named message
    pub const ONE_MESSAGE: u8 = 0;
    /// Poll the named message once, immediately
    pub const ONE_MESSAGE_INSTANTLY: u8 = 1;
    /// Apply to all messages
    pub const ALL_MESSAGES: u8 = 2;
    /// Apply to navigation messages
    pub const NAV_MESSAGES: u8 = 3;
    /// Apply to debug messages
    pub const DEBUG_MESSAGES: u8 = 4;
    /// Apply to navigation debug messages
    pub const NAV_DEBUG_MESSAGES: u8 = 5;

    /// Emit `target` every `update_rate` seconds
    pub fn new(target: u8, update_rate: u8) -> Self {
        Self {
            mode: Self::ONE_MESSAGE,
            target,
            update_rate,
        }
    }
}

impl SirfCommand for SetMessageRate {
    fn message_id(&self) -> u8 {
        Self::ID
    }

    fn to_bytes(&self) -> Vec<u8> {
        vec![Self::ID, self.mode, self.target, self.update_rate, 0, 0, 0, 0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_unique() {
        for (i, (id, _)) in DECODERS.iter().enumerate() {
            for (other, _) in &DECODERS[i + 1..] {
                assert_ne!(id, other, "duplicate decoder registered for id {id}");
            }
        }
    }

    #[test]
    fn test_unrecognized_id() {
        match decode(&[0xFF, 0x00, 0x00]) {
            Err(SirfError::Unrecognized(0xFF)) => {}
            other => panic!("expected unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn test_measured_navigation_decode() {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&100i32.to_be_bytes());
        payload.extend_from_slice(&(-200i32).to_be_bytes());
        payload.extend_from_slice(&300i32.to_be_bytes());
        payload.extend_from_slice(&16i16.to_be_bytes()); // 2.0 m/s
        payload.extend_from_slice(&(-8i16).to_be_bytes()); // -1.0 m/s
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload.push(0x84); // dgps + pmode 4
        payload.push(10); // hdop 2.0
        payload.push(0x02); // solution validated
        payload.extend_from_slice(&1400u16.to_be_bytes());
        payload.extend_from_slice(&8640000u32.to_be_bytes()); // 86400 s
        payload.push(7);
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 0, 0, 0, 0, 0]);

        let msg = decode(&payload).unwrap();
        let nav = match msg {
            Message::MeasuredNavigation(nav) => nav,
            other => panic!("wrong type: {other:?}"),
        };

        assert_eq!(nav.pos, [100.0, -200.0, 300.0]);
        assert_eq!(nav.velocity, [2.0, -1.0, 0.0]);
        assert!(nav.dgps);
        assert_eq!(nav.position_mode, 4);
        assert_eq!(nav.hdop, 2.0);
        assert!(nav.solution_validated);
        assert_eq!(nav.gps_week, 1400);
        assert_eq!(nav.gps_tow, 86400.0);
        assert_eq!(nav.sv_count, 7);
        assert_eq!(nav.channel_prns[2], 3);
    }

    #[test]
    fn test_short_payload_reports_length() {
        match decode(&[2u8, 0x00, 0x01]) {
            Err(SirfError::Length { id: 2, len: 3 }) => {}
            other => panic!("expected length error, got {other:?}"),
        }
    }

    #[test]
    fn test_software_version_decode() {
        let mut payload = vec![6u8];
        payload.extend_from_slice(b"GSW3.2.4_3.1.00.12-SDK003P1.00a\0\0");

        match decode(&payload).unwrap() {
            Message::SoftwareVersion(v) => {
                assert_eq!(v.version, "GSW3.2.4_3.1.00.12-SDK003P1.00a");
            }
            other => panic!("wrong type: {other:?}"),
        }
    }

    #[test]
    fn test_sv_state_decode() {
        fn wire_double(value: f64) -> [u8; 8] {
            let be = value.to_be_bytes();
            let mut out = [0u8; 8];
            out[..4].copy_from_slice(&be[4..]);
            out[4..].copy_from_slice(&be[..4]);
            out
        }

        let mut payload = vec![30u8, 21]; // PRN 21
        payload.extend_from_slice(&wire_double(123456.5)); // gps_time
        for v in [1.0e7, -2.0e7, 2.5e7, 100.0, -200.0, 300.0, 1.5e-4] {
            payload.extend_from_slice(&wire_double(v));
        }
        payload.extend_from_slice(&1.0e-9f32.to_be_bytes()); // clock_drift
        payload.push(0x1F); // ephemeris flags
        payload.extend_from_slice(&[0u8; 8]); // reserved
        payload.extend_from_slice(&4.5f32.to_be_bytes()); // iono_delay

        match decode(&payload).unwrap() {
            Message::NavLibSvState(sv) => {
                assert_eq!(sv.satellite_id, 21);
                assert_eq!(sv.gps_time, 123456.5);
                assert_eq!(sv.pos, [1.0e7, -2.0e7, 2.5e7]);
                assert_eq!(sv.velocity, [100.0, -200.0, 300.0]);
                assert_eq!(sv.clock_bias, 1.5e-4);
                assert_eq!(sv.clock_drift, 1.0e-9);
                assert_eq!(sv.iono_delay, 4.5);
            }
            other => panic!("wrong type: {other:?}"),
        }
    }

    #[test]
    fn test_geodetic_sat_ids() {
        let geo = GeodeticNavigationData {
            nav_valid: 0,
            nav_type: 0,
            extended_gps_week: 0,
            gps_tow: 0.0,
            utc_year: 0,
            utc_month: 0,
            utc_day: 0,
            utc_hour: 0,
            utc_minute: 0,
            utc_second: 0.0,
            sat_id_mask: 0b1010_0001,
            latitude: 0.0,
            longitude: 0.0,
            altitude_ellipsoid: 0.0,
            altitude_msl: 0.0,
            map_datum: 0,
            speed_over_ground: 0.0,
            course_over_ground: 0.0,
            climb_rate: 0.0,
            heading_rate: 0.0,
            ehpe: 0.0,
            evpe: 0.0,
            ete: 0.0,
            ehve: 0.0,
            clock_bias: 0.0,
            clock_bias_error: 0.0,
            clock_drift: 0.0,
            clock_drift_error: 0.0,
            distance: 0,
            distance_error: 0,
            heading_error: 0,
            hdop: 0.0,
            additional_mode_info: 0,
        };
        assert_eq!(geo.sat_ids(), vec![0, 5, 7]);
    }

    #[test]
    fn test_switch_to_nmea_wire_form() {
        let cmd = SwitchToNmeaProtocol::new(4800);
        let bytes = cmd.to_bytes();

        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0], 129);
        assert_eq!(bytes[1], 2); // mode
        assert_eq!(&bytes[2..4], &[1, 1]); // GGA every second
        assert_eq!(&bytes[4..6], &[0, 1]); // GLL off
        assert_eq!(&bytes[8..10], &[5, 1]); // GSV every 5 s
        assert_eq!(&bytes[22..24], &4800u16.to_be_bytes());
    }

    #[test]
    fn test_poll_software_version_wire_form() {
        assert_eq!(PollSoftwareVersion.to_bytes(), vec![132, 0]);
    }

    #[test]
    fn test_set_message_rate_wire_form() {
        let cmd = SetMessageRate::new(NavLibMeasurementData::ID, 1);
        assert_eq!(cmd.to_bytes(), vec![166, 0, 28, 1, 0, 0, 0, 0]);
    }
}
