//! Errors reported while setting up a serial channel.
//!
//! Faults that happen after setup (a failed read or write) are never returned to callers. They
//! are logged and turn the client inactive instead, see [`Client::is_active`].
//!
//! [`Client::is_active`]: crate::serial::Client::is_active

use thiserror::Error;

use std::fmt;
use std::io;

use crate::serial::ChannelOption;

/// An error that occurred while constructing a [`Client`](crate::serial::Client).
#[derive(Error, Debug)]
pub enum Error {
    /// The channel could not be opened. The client is inactive.
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// The channel was opened, but some options could not be applied. The client is still
    /// active, but the device may not understand it.
    #[error("failed to configure serial port: {}", DisplayList(.0))]
    Configure(Vec<OptionError>),

    /// The runtime driving the channel could not be created.
    #[error("failed to build the serial I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    /// The service thread could not be spawned.
    #[error("failed to spawn the serial I/O thread: {0}")]
    Spawn(#[source] io::Error),

    /// The service thread stopped before reporting whether the channel was opened.
    #[error("the serial I/O thread stopped unexpectedly")]
    ServiceStopped,
}

/// A single channel option that could not be applied.
#[derive(Error, Debug)]
#[error("could not set {option}: {source}")]
pub struct OptionError {
    pub option: ChannelOption,
    #[source]
    pub source: serialport::Error,
}

/// Formats a list of errors separated by semicolons.
struct DisplayList<'a>(&'a [OptionError]);

impl fmt::Display for DisplayList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", e)?;
        }

        Ok(())
    }
}
