use std::time::Duration;

use crate::error::{Result, TransportError};

/// Default baud rate: 9600.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout: 5 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Line settings applied when a port is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate. Default: 9600.
    pub baud_rate: u32,
    /// Data bits per character (5-8). Default: 8.
    pub data_bits: u8,
    /// Parity. Default: none.
    pub parity: Parity,
    /// Stop bits. Default: one.
    pub stop_bits: StopBits,
    /// Flow control. Default: none.
    pub flow_control: FlowControl,
    /// Read timeout. A read that sees no bytes within this window fails
    /// with `ErrorKind::TimedOut`. Default: 5 seconds.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Validate settings that the driver would otherwise reject late.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(TransportError::Configure(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        data_bits(self.data_bits)?;
        Ok(())
    }

    pub(crate) fn builder(&self, path: &str) -> Result<serialport::SerialPortBuilder> {
        self.validate()?;
        Ok(serialport::new(path, self.baud_rate)
            .data_bits(data_bits(self.data_bits)?)
            .parity(match self.parity {
                Parity::None => serialport::Parity::None,
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
            })
            .stop_bits(match self.stop_bits {
                StopBits::One => serialport::StopBits::One,
                StopBits::Two => serialport::StopBits::Two,
            })
            .flow_control(match self.flow_control {
                FlowControl::None => serialport::FlowControl::None,
                FlowControl::Software => serialport::FlowControl::Software,
                FlowControl::Hardware => serialport::FlowControl::Hardware,
            })
            .timeout(self.timeout))
    }
}

fn data_bits(bits: u8) -> Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::Configure(format!(
            "data bits must be 5-8, got {other}"
        ))),
    }
}
