//! A mock serial channel implementation.

use instrument_link::{Channel, ChannelOption, OpenChannelFn};
use serialport::ErrorKind;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

/// The state behind a [`TestPort`] and its channel.
#[derive(Default)]
struct State {
    /// Data waiting to be read. Each entry is delivered by a single read.
    incoming: VecDeque<Vec<u8>>,
    read_waker: Option<Waker>,
    /// Every completed write call, in order.
    writes: Vec<Vec<u8>>,
    write_waker: Option<Waker>,
    /// Whether writes are held back until resumed.
    writes_paused: bool,
    read_error: bool,
    write_error: bool,
    /// Whether opening the port fails.
    open_error: bool,
    /// Options for which `set_option` fails.
    rejected: Option<fn(&ChannelOption) -> bool>,
    /// Options that were applied successfully.
    options: Vec<ChannelOption>,
    open: bool,
    /// How many times a channel was closed.
    closes: usize,
}

impl State {
    fn wake_all(&mut self) -> Vec<Waker> {
        self.read_waker.take().into_iter().chain(self.write_waker.take()).collect()
    }
}

/// A scripted serial port. Data pushed with [`push_read`][Self::push_read] is delivered to reads
/// and every write call is recorded. This type is a handle that can be cloned to control the port
/// from multiple locations.
#[derive(Clone, Default)]
pub struct TestPort {
    state: Arc<Mutex<State>>,
}

impl TestPort {
    /// Returns a new `TestPort` that has no errors and no data to read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a function that opens a channel to this port.
    pub fn open_fn(&self) -> OpenChannelFn {
        let state = self.state.clone();

        Box::new(move |_: &str| {
            let mut s = state.lock().unwrap();

            if s.open_error {
                return Err(serialport::Error::new(ErrorKind::NoDevice, "no such device"));
            }
            s.open = true;
            drop(s);

            Ok(Box::new(TestChannel { state }) as Box<dyn Channel>)
        })
    }

    /// Delivers `data` to the channel with a single read completion. Empty data is ignored.
    pub fn push_read(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        let waker = {
            let mut state = self.state();
            state.incoming.push_back(data.to_vec());
            state.read_waker.take()
        };

        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Returns the number of pushed reads that have not been delivered yet.
    pub fn pending_reads(&self) -> usize {
        self.state().incoming.len()
    }

    /// Returns the data of every completed write call, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    /// Returns all written bytes.
    pub fn written(&self) -> Vec<u8> {
        self.state().writes.concat()
    }

    /// Holds back all writes until [`resume_writes`][Self::resume_writes] is called.
    pub fn pause_writes(&self) {
        self.state().writes_paused = true;
    }

    pub fn resume_writes(&self) {
        let waker = {
            let mut state = self.state();
            state.writes_paused = false;
            state.write_waker.take()
        };

        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Returns whether a write is being held back by [`pause_writes`][Self::pause_writes].
    pub fn is_write_waiting(&self) -> bool {
        let state = self.state();
        state.writes_paused && state.write_waker.is_some()
    }

    /// Makes reads fail. Simulates a physical disconnect.
    pub fn set_read_error(&self, error: bool) {
        self.set(|s| s.read_error = error);
    }

    /// Makes writes fail.
    pub fn set_write_error(&self, error: bool) {
        self.set(|s| s.write_error = error);
    }

    /// Makes opening the port fail.
    pub fn set_open_error(&self, error: bool) {
        self.state().open_error = error;
    }

    /// Makes `set_option` fail for every option matching `rejected`.
    pub fn reject_options(&self, rejected: fn(&ChannelOption) -> bool) {
        self.state().rejected = Some(rejected);
    }

    /// Returns the options that were applied successfully, in order.
    pub fn options(&self) -> Vec<ChannelOption> {
        self.state().options.clone()
    }

    /// Returns whether a channel to the port is open.
    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Returns how many times a channel to the port was closed.
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    /// Applies `f` to the state and wakes any pending operation so that it notices the change.
    fn set<F: FnOnce(&mut State)>(&self, f: F) {
        let wakers = {
            let mut state = self.state();
            f(&mut state);
            state.wake_all()
        };

        wakers.into_iter().for_each(Waker::wake);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

/// The channel end of a [`TestPort`].
pub struct TestChannel {
    state: Arc<Mutex<State>>,
}

impl TestChannel {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl AsyncRead for TestChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.state();

        if state.read_error {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }

        match state.incoming.pop_front() {
            Some(mut data) => {
                let bytes = data.len().min(buf.remaining());
                buf.put_slice(&data[..bytes]);

                // Data that could not fit in the target buffer is delivered next time
                if bytes < data.len() {
                    state.incoming.push_front(data.split_off(bytes));
                }

                Poll::Ready(Ok(()))
            }
            None => {
                state.read_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl AsyncWrite for TestChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state();

        if state.write_error {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }

        if state.writes_paused {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        state.write_waker = None;
        state.writes.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Channel for TestChannel {
    fn set_option(&mut self, option: ChannelOption) -> serialport::Result<()> {
        let mut state = self.state();

        if state.rejected.map_or(false, |r| r(&option)) {
            return Err(serialport::Error::new(ErrorKind::InvalidInput, "unsupported option"));
        }

        state.options.push(option);
        Ok(())
    }
}

impl Drop for TestChannel {
    fn drop(&mut self) {
        let mut state = self.state();
        state.open = false;
        state.closes += 1;
    }
}
