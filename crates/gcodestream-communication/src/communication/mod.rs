//! Transport layer
//!
//! The stream controller only needs a byte pipe: write a command, read
//! whatever the firmware has sent back. Serial is the production transport;
//! tests plug in their own [`Communicator`].

pub mod serial;

use gcodestream_core::{ConnectionError, Result};
use gcodestream_settings::ConnectionSettings;

pub use serial::{list_ports, SerialCommunicator, SerialPortInfo};

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters used to open a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 10,
        }
    }
}

impl ConnectionParams {
    /// Parameters for `port` at `baud_rate`, 8N1
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Reject parameters no port can be opened with
    pub fn validate(&self) -> std::result::Result<(), ConnectionError> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&ConnectionSettings> for ConnectionParams {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            timeout_ms: settings.read_timeout_ms,
            ..Self::default()
        }
    }
}

/// A byte pipe to the firmware
pub trait Communicator: Send {
    /// Open the connection
    fn connect(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Close the connection
    fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write bytes, returning how many were written
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Bytes received since the last call; empty when nothing arrived
    fn receive(&mut self) -> Result<Vec<u8>>;
}

/// Communicator that is never connected
#[derive(Debug, Default)]
pub struct NoOpCommunicator;

impl NoOpCommunicator {
    /// Create a new no-op communicator
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for NoOpCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        Err(ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason: "no transport configured".to_string(),
        }
        .into())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _data: &[u8]) -> Result<usize> {
        Err(gcodestream_core::ControllerError::NotConnected.into())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
