use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::debug;

use super::{PortFactory, PortSettings, SourceError};

/// Opens the sensor node's UART with the fixed 8N1 line settings.
pub struct SerialPortFactory {
    settings: PortSettings,
}

impl SerialPortFactory {
    pub fn new(settings: PortSettings) -> Self {
        Self { settings }
    }
}

impl PortFactory for SerialPortFactory {
    type Port = Box<dyn SerialPort>;

    fn open(&self) -> Result<Self::Port, SourceError> {
        let settings = &self.settings;
        debug!(
            device = %settings.device,
            baud = settings.baud_rate,
            "opening serial port"
        );
        let open_error = |message: String| SourceError::Open {
            device: settings.device.clone(),
            message,
        };
        let data_bits = data_bits(settings.data_bits)
            .ok_or_else(|| open_error(format!("unsupported data bits: {}", settings.data_bits)))?;
        let stop_bits = stop_bits(settings.stop_bits)
            .ok_or_else(|| open_error(format!("unsupported stop bits: {}", settings.stop_bits)))?;

        serialport::new(&settings.device, settings.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(Parity::None)
            .timeout(settings.poll_timeout)
            .open()
            .map_err(|err| open_error(err.to_string()))
    }

    fn describe(&self) -> String {
        self.settings.device.clone()
    }
}

fn data_bits(bits: u8) -> Option<DataBits> {
    match bits {
        5 => Some(DataBits::Five),
        6 => Some(DataBits::Six),
        7 => Some(DataBits::Seven),
        8 => Some(DataBits::Eight),
        _ => None,
    }
}

fn stop_bits(bits: u8) -> Option<StopBits> {
    match bits {
        1 => Some(StopBits::One),
        2 => Some(StopBits::Two),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{SerialPortFactory, data_bits, stop_bits};
    use crate::source::{PortFactory, PortSettings, SourceError};
    use serialport::{DataBits, StopBits};

    #[test]
    fn maps_line_settings() {
        assert_eq!(data_bits(8), Some(DataBits::Eight));
        assert_eq!(stop_bits(1), Some(StopBits::One));
        assert_eq!(data_bits(9), None);
        assert_eq!(stop_bits(3), None);
    }

    #[test]
    fn missing_device_is_open_error() {
        let factory =
            SerialPortFactory::new(PortSettings::with_device("/nonexistent/emonbeat-tty"));
        let err = factory.open().err().expect("open should fail");
        assert!(
            matches!(err, SourceError::Open { ref device, .. } if device == "/nonexistent/emonbeat-tty")
        );
        assert_eq!(factory.describe(), "/nonexistent/emonbeat-tty");
    }
}
