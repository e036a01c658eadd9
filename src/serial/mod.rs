//! Serial channel communication and handling.

mod client;
mod port;
mod server;
mod state;

pub use client::Client;
pub use port::{open_serial_fn, Channel, ChannelOption, OpenChannelFn};
pub use state::LinkState;

use log::{debug, error};
use tokio::sync::watch;

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::queue::{ReadBuffer, WriteQueue};
use state::ActivationState;

/// Why the link is being closed.
#[derive(Debug)]
enum CloseReason {
    /// A caller asked for the link to be closed, or dropped the client.
    Requested,
    /// An outstanding operation was cancelled because the link is already closing.
    Aborted,
    /// A read or write failed.
    Fault(io::Error),
}

/// State shared between a [`Client`] and its service thread.
struct Shared {
    /// Bytes received from the channel.
    read_buf: Mutex<ReadBuffer>,
    /// Bytes waiting to be written to the channel.
    write_queue: Mutex<WriteQueue>,
    state: ActivationState,
    /// Signals outstanding operations to stop once a close has begun.
    shutdown: watch::Sender<()>,
}

impl Shared {
    fn new() -> Self {
        let (shutdown, _) = watch::channel(());

        Shared {
            read_buf: Mutex::new(ReadBuffer::new()),
            write_queue: Mutex::new(WriteQueue::new()),
            state: ActivationState::new(),
            shutdown,
        }
    }

    fn read_buf(&self) -> MutexGuard<'_, ReadBuffer> {
        lock(&self.read_buf)
    }

    fn write_queue(&self) -> MutexGuard<'_, WriteQueue> {
        lock(&self.write_queue)
    }

    /// Closes the link unless it is already closing.
    ///
    /// Cancellations are ignored, as they are caused by a close that is already in progress.
    fn close(&self, path: &str, reason: CloseReason) {
        match reason {
            CloseReason::Aborted => return,
            CloseReason::Requested => debug!("Close requested for {}", path),
            CloseReason::Fault(e) => error!("Serial port {} failed: {}", path, e),
        }

        if self.state.begin_close() {
            self.shutdown.send_replace(());
        }
    }
}

/// Locks `mutex`, recovering the data if another thread panicked while holding it. The guarded
/// byte queues are valid in any state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
