//! Serial port transport
//!
//! Provides the serial implementation of [`Transport`] for direct hardware
//! connection to GRBL controllers via USB or RS-232.
//!
//! The port handle is cloned at open time so that the reader half (owned by
//! the receive loop) and the writer half (shared by every sender) lock
//! independently.

use super::{ConnectionParams, SerialParity, Transport};
use grblink_core::{ConnectionError, Error, Result};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List available serial ports on the system
///
/// Filters ports to include only CNC controller patterns:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::from(ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        })
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo {
                port_name: port.port_name.clone(),
                description: get_port_description(port),
                manufacturer: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
                info.vid = Some(usb_info.vid);
                info.pid = Some(usb_info.pid);
                info.manufacturer = usb_info.manufacturer.clone();
            }
            info
        })
        .collect())
}

/// Check if a port name matches CNC controller patterns
fn is_valid_cnc_port(port_name: &str) -> bool {
    // Windows COM ports
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    // Linux USB and ACM devices
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }

    // macOS serial and modem devices
    port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Convert a parity setting to serialport format
fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn io_error(e: io::Error) -> Error {
    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
        return Error::Io(e);
    }
    ConnectionError::IoError {
        reason: e.to_string(),
    }
    .into()
}

/// Reader half with its partial-line buffer
struct LineReader {
    port: Box<dyn serialport::SerialPort>,
    buffer: Vec<u8>,
    timeout_ms: u64,
}

impl LineReader {
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(
            String::from_utf8_lossy(&raw)
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        )
    }
}

/// Serial implementation of [`Transport`] using the `serialport` crate
#[derive(Default)]
pub struct SerialTransport {
    params: Mutex<Option<ConnectionParams>>,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    reader: Mutex<Option<LineReader>>,
}

impl SerialTransport {
    /// Create a closed, unconfigured serial transport
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for SerialTransport {
    fn configure(&self, params: &ConnectionParams) -> Result<()> {
        if params.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            }
            .into());
        }
        if params.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }
        *self.params.lock() = Some(params.clone());
        Ok(())
    }

    fn open(&self) -> Result<()> {
        let params = self
            .params
            .lock()
            .clone()
            .ok_or_else(|| ConnectionError::InvalidParameters {
                reason: "transport not configured".to_string(),
            })?;

        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Err(ConnectionError::FailedToOpen {
                port: params.port,
                reason: "already open".to_string(),
            }
            .into());
        }

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid data bits: {}", other),
                }
                .into())
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid stop bits: {}", other),
                }
                .into())
            }
        };

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms.max(1)))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        let read_half = port.try_clone().map_err(|e| ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason: format!("cannot clone port handle: {}", e),
        })?;

        *self.reader.lock() = Some(LineReader {
            port: read_half,
            buffer: Vec::with_capacity(256),
            timeout_ms: params.timeout_ms,
        });
        *writer = Some(port);
        tracing::info!("Opened serial port {} at {} baud", params.port, params.baud_rate);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let writer = self.writer.lock().take();
        let reader = self.reader.lock().take();
        if writer.is_some() || reader.is_some() {
            tracing::info!("Closed serial port {}", self.name());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    fn has_data_available(&self) -> Result<bool> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(ConnectionError::ConnectionLost {
            reason: "port closed".to_string(),
        })?;
        if reader.buffer.contains(&b'\n') {
            return Ok(true);
        }
        let pending = reader
            .port
            .bytes_to_read()
            .map_err(|e| ConnectionError::SerialError {
                reason: e.to_string(),
            })?;
        Ok(pending > 0)
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or(ConnectionError::ConnectionLost {
            reason: "port closed".to_string(),
        })?;
        port.write_all(data).map_err(io_error)?;
        port.flush().map_err(io_error)?;
        Ok(())
    }

    fn read_line(&self) -> Result<String> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(ConnectionError::ConnectionLost {
            reason: "port closed".to_string(),
        })?;

        let mut chunk = [0u8; 256];
        loop {
            if let Some(line) = reader.take_line() {
                return Ok(line);
            }
            match reader.port.read(&mut chunk) {
                Ok(0) => {
                    return Err(ConnectionError::ConnectionTimeout {
                        timeout_ms: reader.timeout_ms,
                    }
                    .into())
                }
                Ok(n) => reader.buffer.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(io_error(e)),
            }
        }
    }

    fn name(&self) -> String {
        self.params
            .lock()
            .as_ref()
            .map(|p| p.port.clone())
            .unwrap_or_else(|| "serial".to_string())
    }
}
