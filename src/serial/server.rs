//! The service side of a serial link.
//!
//! A [`Server`] runs on its own thread with a single-threaded `tokio` runtime. It owns the
//! channel and drives three tasks concurrently until the link closes:
//!
//! - the read pipeline, which always has exactly one read outstanding and appends whatever arrives
//!   to the shared read buffer,
//! - the write pipeline, which transmits the shared write queue one byte per write, never starting
//!   a write before the previous one has completed,
//! - the command dispatcher, which receives work posted by the [`Client`](super::Client).

use futures::channel::mpsc::UnboundedReceiver;
use futures::channel::oneshot;
use futures::StreamExt;
use log::{error, info};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime;
use tokio::sync::{watch, Notify};

use std::sync::Arc;

use super::port::{self, OpenChannelFn};
use super::{CloseReason, Shared};
use crate::config::SerialConfig;
use crate::error::Error;

/// The maximum number of bytes taken from the channel by a single read.
const READ_SCRATCH_LEN: usize = 512;

/// Work posted to the service thread.
#[derive(Debug)]
pub(super) enum Command {
    /// The write queue was empty and now has a byte to transmit.
    StartWrite,
}

/// A server that directly communicates with a serial channel, moving bytes between it and the
/// buffers shared with a [`Client`](super::Client).
pub(super) struct Server {
    config: SerialConfig,
    /// Opens the channel once the server is running.
    open_fn: OpenChannelFn,
    shared: Arc<Shared>,
    commands: UnboundedReceiver<Command>,
}

impl Server {
    pub fn new(
        config: SerialConfig,
        open_fn: OpenChannelFn,
        shared: Arc<Shared>,
        commands: UnboundedReceiver<Command>,
    ) -> Self {
        Server {
            config,
            open_fn,
            shared,
            commands,
        }
    }

    /// Opens the channel and processes I/O until the link is closed.
    ///
    /// This blocks, so a separate thread must be used for it. The result of opening and configuring
    /// the channel is sent on `ready` before any I/O takes place.
    pub fn run(self, ready: oneshot::Sender<Result<(), Error>>) {
        let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to build the I/O runtime for {}: {}", self.config.path, e);
                self.shared.state.finish_close();
                let _ = ready.send(Err(Error::Runtime(e)));
                return;
            }
        };

        runtime.block_on(self.serve(ready));
    }

    async fn serve(self, ready: oneshot::Sender<Result<(), Error>>) {
        let Server {
            config,
            open_fn,
            shared,
            mut commands,
        } = self;
        let path = config.path.as_str();

        let mut channel = match port::open(&config, open_fn) {
            Ok(c) => c,
            Err(e) => {
                // Nothing was opened, so there is nothing to close
                shared.state.finish_close();
                let _ = ready.send(Err(e));
                return;
            }
        };
        info!("Opened serial port {}", path);

        let configured = port::configure(channel.as_mut(), &config);

        // Every task must be subscribed before any of them can start a close
        let read_shutdown = shared.shutdown.subscribe();
        let write_shutdown = shared.shutdown.subscribe();
        let command_shutdown = shared.shutdown.subscribe();
        let write_ready = Notify::new();

        let _ = ready.send(configured);

        let (reader, writer) = io::split(channel);

        let read = async {
            let reason = read_pipeline(reader, &shared, read_shutdown).await;
            shared.close(path, reason);
        };
        let write = async {
            let reason = write_pipeline(writer, &shared, &write_ready, write_shutdown).await;
            shared.close(path, reason);
        };
        let dispatch = dispatch_commands(
            &mut commands,
            &shared,
            path,
            &write_ready,
            command_shutdown,
        );

        tokio::join!(read, write, dispatch);

        // Both halves of the channel have been dropped by now
        shared.state.finish_close();
        info!("Closed serial port {}", path);
    }
}

/// Keeps one read outstanding on `reader` until it fails or the link starts closing.
async fn read_pipeline<R: AsyncRead + Unpin>(
    mut reader: R,
    shared: &Shared,
    mut shutdown: watch::Receiver<()>,
) -> CloseReason {
    let mut scratch = [0; READ_SCRATCH_LEN];

    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.changed() => return CloseReason::Aborted,
            result = reader.read(&mut scratch) => result,
        };

        match result {
            Ok(0) => return CloseReason::Fault(io::ErrorKind::UnexpectedEof.into()),
            Ok(bytes) => shared.read_buf().extend(&scratch[..bytes]),
            Err(e) => return CloseReason::Fault(e),
        }
    }
}

/// Transmits the write queue one byte at a time whenever `write_ready` is notified, until a write
/// fails or the link starts closing.
async fn write_pipeline<W: AsyncWrite + Unpin>(
    mut writer: W,
    shared: &Shared,
    write_ready: &Notify,
    mut shutdown: watch::Receiver<()>,
) -> CloseReason {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return CloseReason::Aborted,
            _ = write_ready.notified() => {},
        }

        loop {
            // The lock is released before writing
            let pending = shared.write_queue().front();
            let Some(pending) = pending else {
                break;
            };

            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => return CloseReason::Aborted,
                result = transmit(&mut writer, pending.byte) => result,
            };

            if let Err(e) = result {
                return CloseReason::Fault(e);
            }

            if !shared.write_queue().complete(pending) {
                break;
            }
        }
    }
}

/// Writes a single byte with a single write call.
async fn transmit<W: AsyncWrite + Unpin>(writer: &mut W, byte: u8) -> io::Result<()> {
    writer.write_all(&[byte]).await?;
    writer.flush().await
}

/// Handles commands posted by the client until the link starts closing.
///
/// The client going away counts as a close request.
async fn dispatch_commands(
    commands: &mut UnboundedReceiver<Command>,
    shared: &Shared,
    path: &str,
    write_ready: &Notify,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            command = commands.next() => command,
        };

        match command {
            Some(Command::StartWrite) => write_ready.notify_one(),
            None => shared.close(path, CloseReason::Requested),
        }
    }
}
