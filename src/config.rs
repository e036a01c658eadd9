//! Serial channel configuration.

use clap::{Args, ValueEnum};

/// The baud rate used when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Flow control mode of the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FlowControl {
    #[default]
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

/// Parity checking mode of the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits of the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(stop_bits: StopBits) -> Self {
        match stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Everything needed to open and configure a serial channel. The character size is always 8 bits.
#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct SerialConfig {
    /// Path of the serial device (e.g. /dev/ttyUSB0 or COM3)
    pub path: String,

    /// Baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Flow control mode
    #[arg(long, value_enum, default_value_t = FlowControl::None)]
    pub flow_control: FlowControl,

    /// Parity mode
    #[arg(long, value_enum, default_value_t = Parity::None)]
    pub parity: Parity,

    /// Number of stop bits
    #[arg(long, value_enum, default_value_t = StopBits::One)]
    pub stop_bits: StopBits,
}

impl SerialConfig {
    /// Returns a configuration for `path` with 9600 baud, no flow control, no parity and one
    /// stop bit.
    pub fn new(path: impl Into<String>) -> Self {
        SerialConfig {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }
}
