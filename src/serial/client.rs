//! A client for serial channel communication.

use futures::channel::mpsc::{self, UnboundedSender};
use futures::channel::oneshot;
use futures::executor::block_on;
use log::error;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::port::{open_serial_fn, OpenChannelFn};
use super::server::{Command, Server};
use super::state::LinkState;
use super::{lock, CloseReason, Shared};
use crate::config::SerialConfig;
use crate::error::Error;

/// A handle to a serial link whose I/O is processed on a background thread.
///
/// Every method may be called from any number of threads and returns without waiting for I/O.
/// Bytes are queued with [`write_byte`][Self::write_byte] and taken with
/// [`read_all`][Self::read_all] or [`read_one`][Self::read_one].
///
/// If the channel fails or is closed, the client becomes inactive for good: writes are ignored
/// and no more bytes arrive. Dropping the client closes the channel and waits for the background
/// thread to exit.
pub struct Client {
    shared: Arc<Shared>,
    /// Posts work to the service thread. The lock keeps concurrent posts from racing.
    commands: Mutex<UnboundedSender<Command>>,
    /// The service thread, if it was started.
    service: Option<JoinHandle<()>>,
    path: String,
}

impl Client {
    /// Opens the serial port described by `config`.
    ///
    /// Returns a `Client` regardless of whether the port was opened and configured successfully,
    /// and additionally an `Err` describing what went wrong. If the port could not be opened, the
    /// client is inactive. If only some options could not be applied, it is still active.
    pub fn open(config: SerialConfig) -> (Self, Result<(), Error>) {
        let open_fn = open_serial_fn(config.baud_rate);
        Client::with_open_fn(config, open_fn)
    }

    /// Like [`open`][Self::open], but uses a custom function for opening the channel.
    ///
    /// `open_fn` is called on the service thread from within a `tokio` runtime.
    pub fn with_open_fn(config: SerialConfig, open_fn: OpenChannelFn) -> (Self, Result<(), Error>) {
        let shared = Arc::new(Shared::new());
        let (command_tx, command_rx) = mpsc::unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = config.path.clone();

        let server = Server::new(config, open_fn, shared.clone(), command_rx);
        let spawned = thread::Builder::new()
            .name(format!("serial {}", path))
            .spawn(move || server.run(ready_tx));

        let (service, result) = match spawned {
            Ok(handle) => {
                // Wait until the server has tried to open and configure the channel
                let result = block_on(ready_rx).unwrap_or_else(|_| {
                    error!("The serial I/O thread for {} stopped unexpectedly", path);
                    shared.state.finish_close();
                    Err(Error::ServiceStopped)
                });
                (Some(handle), result)
            }
            Err(e) => {
                error!("Failed to spawn the serial I/O thread for {}: {}", path, e);
                shared.state.finish_close();
                (None, Err(Error::Spawn(e)))
            }
        };

        let client = Client {
            shared,
            commands: Mutex::new(command_tx),
            service,
            path,
        };

        (client, result)
    }

    /// Queues `byte` to be written. Does nothing if the client is inactive.
    pub fn write_byte(&self, byte: u8) {
        if !self.is_active() {
            return;
        }

        let start = self.shared.write_queue().push(byte);

        // Nothing is being written, so a write must be started
        if start {
            self.post(Command::StartWrite);
        }
    }

    /// Queues every byte of `data` to be written, in order. Does nothing if the client is inactive.
    ///
    /// The bytes are still written to the channel one at a time.
    pub fn write(&self, data: &[u8]) {
        if !self.is_active() {
            return;
        }

        let start = self.shared.write_queue().extend(data);

        if start {
            self.post(Command::StartWrite);
        }
    }

    /// Closes the channel.
    ///
    /// The client is inactive once this returns. Outstanding I/O is cancelled and the channel is
    /// released on the service thread shortly afterwards; see [`state`][Self::state].
    pub fn close(&self) {
        if self.is_active() {
            self.shared.close(&self.path, CloseReason::Requested);
        }
    }

    /// Returns whether the channel is still open and processing I/O.
    pub fn is_active(&self) -> bool {
        self.shared.state.is_active()
    }

    pub fn state(&self) -> LinkState {
        self.shared.state.get()
    }

    /// Discards all received bytes that have not been read and all queued bytes that have not been
    /// written yet. A byte that is being written at the time still reaches the channel.
    pub fn purge(&self) {
        self.shared.read_buf().clear();
        self.shared.write_queue().clear();
    }

    /// Removes and returns every received byte, oldest first.
    pub fn read_all(&self) -> Vec<u8> {
        self.shared.read_buf().drain_all()
    }

    /// Removes and returns the oldest received byte, or `None` if there is none.
    pub fn read_one(&self) -> Option<u8> {
        self.shared.read_buf().pop()
    }

    /// Returns the number of received bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.shared.read_buf().len()
    }

    /// Returns the path of the channel.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn post(&self, command: Command) {
        let commands = lock(&self.commands);

        // This only fails once the service thread has exited, when there is nothing left to do
        let _ = commands.unbounded_send(command);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();

        if let Some(handle) = self.service.take() {
            if handle.join().is_err() {
                error!("The serial I/O thread for {} panicked", self.path);
            }
        }
    }
}
