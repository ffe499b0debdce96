mod file;
mod line;
mod serial;

pub use file::FilePortFactory;
pub use line::{CancelToken, Deadline, LineReader, READ_CHUNK_SIZE};
pub use serial::SerialPortFactory;

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Default device path of the sensor node's UART.
pub const DEFAULT_DEVICE: &str = "/dev/ttyAMA0";

/// Opens an exclusively owned byte port for one fetch cycle.
///
/// The port is released when the returned value is dropped.
pub trait PortFactory {
    type Port: Read;

    fn open(&self) -> Result<Self::Port, SourceError>;

    /// Human-readable name of the device, used in logs and errors.
    fn describe(&self) -> String;
}

/// Fixed serial line parameters (9600 baud, 8N1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// Upper bound on a single blocking read before control returns to the
    /// line reader so deadlines and cancellation can be checked.
    pub poll_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            poll_timeout: Duration::from_millis(100),
        }
    }
}

impl PortSettings {
    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {device}: {message}")]
    Open { device: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no complete line within {0:?}")]
    TimedOut(Duration),
    #[error("read cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn is_open_error(&self) -> bool {
        matches!(self, SourceError::Open { .. })
    }
}
