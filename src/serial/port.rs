//! Opening and configuring serial channels.

use log::{debug, error};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPort, SerialStream};

use std::fmt;

use crate::config::SerialConfig;
use crate::error::{Error, OptionError};

/// An asynchronous byte channel bound to a serial device.
///
/// Closing the channel is done by dropping it.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin {
    /// Applies a single configuration option.
    fn set_option(&mut self, option: ChannelOption) -> serialport::Result<()>;
}

/// A function for opening channels given a path.
pub type OpenChannelFn = Box<dyn FnOnce(&str) -> serialport::Result<Box<dyn Channel>> + Send>;

/// A configuration option of a [`Channel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOption {
    BaudRate(u32),
    FlowControl(FlowControl),
    Parity(Parity),
    StopBits(StopBits),
    /// The character size.
    DataBits(DataBits),
}

impl fmt::Display for ChannelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOption::BaudRate(baud) => write!(f, "baud rate to {}", baud),
            ChannelOption::FlowControl(flow) => {
                let flow = match flow {
                    FlowControl::None => "none",
                    FlowControl::Software => "software",
                    FlowControl::Hardware => "hardware",
                };
                write!(f, "flow control to {}", flow)
            }
            ChannelOption::Parity(parity) => {
                let parity = match parity {
                    Parity::None => "none",
                    Parity::Odd => "odd",
                    Parity::Even => "even",
                };
                write!(f, "parity to {}", parity)
            }
            ChannelOption::StopBits(stop_bits) => {
                let stop_bits = match stop_bits {
                    StopBits::One => 1,
                    StopBits::Two => 2,
                };
                write!(f, "stop bits to {}", stop_bits)
            }
            ChannelOption::DataBits(data_bits) => {
                let data_bits = match data_bits {
                    DataBits::Five => 5,
                    DataBits::Six => 6,
                    DataBits::Seven => 7,
                    DataBits::Eight => 8,
                };
                write!(f, "character size to {}", data_bits)
            }
        }
    }
}

impl Channel for SerialStream {
    fn set_option(&mut self, option: ChannelOption) -> serialport::Result<()> {
        match option {
            ChannelOption::BaudRate(baud) => self.set_baud_rate(baud),
            ChannelOption::FlowControl(flow) => self.set_flow_control(flow),
            ChannelOption::Parity(parity) => self.set_parity(parity),
            ChannelOption::StopBits(stop_bits) => self.set_stop_bits(stop_bits),
            ChannelOption::DataBits(data_bits) => self.set_data_bits(data_bits),
        }
    }
}

/// Returns an [`OpenChannelFn`] that opens an OS serial port.
///
/// The returned function must be called from within a `tokio` runtime.
pub fn open_serial_fn(baud_rate: u32) -> OpenChannelFn {
    Box::new(move |path: &str| {
        let builder = tokio_serial::new(path, baud_rate);
        SerialStream::open(&builder).map(|s| Box::new(s) as Box<dyn Channel>)
    })
}

/// Returns the options to apply for `config`, in the order they are applied.
pub fn options(config: &SerialConfig) -> [ChannelOption; 5] {
    [
        ChannelOption::BaudRate(config.baud_rate),
        ChannelOption::FlowControl(config.flow_control.into()),
        ChannelOption::Parity(config.parity.into()),
        ChannelOption::StopBits(config.stop_bits.into()),
        ChannelOption::DataBits(DataBits::Eight),
    ]
}

/// Opens the channel at `config.path` by calling `open_fn`.
pub fn open(config: &SerialConfig, open_fn: OpenChannelFn) -> Result<Box<dyn Channel>, Error> {
    open_fn(&config.path).map_err(|source| {
        error!("Failed to open serial port {}: {}", config.path, source);
        Error::Open {
            path: config.path.clone(),
            source,
        }
    })
}

/// Applies every option of `config` to `channel`.
///
/// A failing option does not stop the remaining ones from being applied. Returns `Err` listing
/// every option that failed.
pub fn configure(channel: &mut dyn Channel, config: &SerialConfig) -> Result<(), Error> {
    let mut failures = Vec::new();

    for option in options(config) {
        debug!("Attempting to set {} of {}", option, config.path);

        if let Err(source) = channel.set_option(option) {
            error!("Failed to set {} of {}: {}", option, config.path, source);
            failures.push(OptionError { option, source });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Configure(failures))
    }
}
