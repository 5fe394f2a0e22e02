//! Live serial port transport

use super::{find_subsequence, LineParams, Parity, Transport, TransportError};
use bytes::BytesMut;
use serialport::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::debug;

/// How many bytes to request per underlying read while scanning for a
/// delimiter.
const BLOCK_SIZE: usize = 64;

/// Serial port transport with deadline-bounded reads
///
/// Keeps a lookahead buffer between calls so delimiter scans never discard
/// partially matched bytes. Reconfiguring closes and reopens the port; the
/// hardware only picks up new line parameters across that cycle.
pub struct SerialTransport {
    port_name: String,
    params: LineParams,
    port: Option<Box<dyn SerialPort>>,
    pending: BytesMut,
    epoch: Instant,
    last_arrival: Option<f64>,
}

impl SerialTransport {
    /// Open a serial port with the given line parameters
    pub fn open(port_name: &str, params: LineParams) -> Result<Self, TransportError> {
        let port = open_port(port_name, params)?;
        Ok(Self {
            port_name: port_name.to_string(),
            params,
            port: Some(port),
            pending: BytesMut::new(),
            epoch: Instant::now(),
            last_arrival: None,
        })
    }

    /// Port name this transport was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn stamp_arrival(&mut self) {
        self.last_arrival = Some(self.epoch.elapsed().as_secs_f64());
    }

    /// Read at least one byte and at most `max` bytes before `deadline`.
    fn raw_read_some(&mut self, max: usize, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; max];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::TimedOut);
            }
            let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
            port.set_timeout(deadline - now)
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            match port.read(&mut buf) {
                Ok(0) => return Err(TransportError::NotConnected),
                Ok(n) => {
                    buf.truncate(n);
                    self.stamp_arrival();
                    return Ok(buf);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Read exactly `count` bytes before `deadline`, bypassing the
    /// lookahead buffer.
    fn raw_read_exact(&mut self, count: usize, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let chunk = self.raw_read_some(count - out.len(), deadline)?;
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

impl Transport for SerialTransport {
    fn read_exact(&mut self, count: usize, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        if self.pending.len() >= count {
            return Ok(self.pending.split_to(count).to_vec());
        }
        let mut out = self.pending.split().to_vec();
        let rest = self.raw_read_exact(count - out.len(), deadline)?;
        out.extend_from_slice(&rest);
        Ok(out)
    }

    fn read_until(
        &mut self,
        delimiter: &[u8],
        deadline: Instant,
    ) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(pos) = find_subsequence(&self.pending, delimiter) {
                return Ok(self.pending.split_to(pos + delimiter.len()).to_vec());
            }
            let chunk = self.raw_read_some(BLOCK_SIZE, deadline)?;
            self.pending.extend_from_slice(&chunk);
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        std::io::Write::write_all(port, data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        std::io::Write::flush(port)?;
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    fn reconfigure(&mut self, params: LineParams) -> Result<(), TransportError> {
        debug!("Reconfiguring {} to {}", self.port_name, params);
        self.pending.clear();
        self.port = None;
        self.port = Some(open_port(&self.port_name, params)?);
        self.params = params;
        Ok(())
    }

    fn line_params(&self) -> LineParams {
        self.params
    }

    fn last_arrival(&self) -> Option<f64> {
        self.last_arrival
    }

    fn connection_info(&self) -> String {
        format!("{} @ {}", self.port_name, self.params)
    }
}

fn open_port(port_name: &str, params: LineParams) -> Result<Box<dyn SerialPort>, TransportError> {
    let data_bits = match params.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };

    let stop_bits = match params.stop_bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    };

    let parity = match params.parity {
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
        Parity::None => serialport::Parity::None,
    };

    serialport::new(port_name, params.baud)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port_name.to_string()),
            serialport::ErrorKind::Io(io_kind) => match io_kind {
                std::io::ErrorKind::PermissionDenied => {
                    TransportError::PermissionDenied(port_name.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            },
            _ => TransportError::ConnectionFailed(e.to_string()),
        })
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::ConnectionFailed(e.to_string()))
}
