//! Communication layer
//!
//! Defines the byte-transport contract a [`Connection`] drives, the serial
//! and in-memory implementations of it, and the connection itself.

pub mod connection;
pub mod mock;
pub mod serial;

use grblink_core::Result;
use serde::{Deserialize, Serialize};

pub use connection::{Connection, ConnectionConfig};
pub use mock::MockTransport;
pub use serial::{list_ports, SerialPortInfo, SerialTransport};

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters applied by [`Transport::configure`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name or address (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds; a read that times out means "no data yet"
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// 8N1 serial parameters for a port and baud rate
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 50,
        }
    }
}

/// Byte transport underneath a connection.
///
/// Every method takes `&self`: implementations serialize access internally so
/// that the receive loop, the poll loop, a streaming session and the caller
/// can all use one transport concurrently. A read in progress must not block
/// writes.
pub trait Transport: Send + Sync {
    /// Store the parameters used by the next `open`
    fn configure(&self, params: &ConnectionParams) -> Result<()>;

    /// Open the link with the configured parameters
    fn open(&self) -> Result<()>;

    /// Close the link. Closing a closed transport is a no-op.
    fn close(&self) -> Result<()>;

    /// True while the link is open
    fn is_open(&self) -> bool;

    /// True if a line (or part of one) is waiting to be read
    fn has_data_available(&self) -> Result<bool>;

    /// Write raw bytes
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Read one line without its terminator.
    ///
    /// May block up to the configured read timeout. A timeout is reported as
    /// an error for which `Error::is_timeout()` is true.
    fn read_line(&self) -> Result<String>;

    /// Human-readable name for logs
    fn name(&self) -> String {
        "transport".to_string()
    }
}
