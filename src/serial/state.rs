//! The activation state of a serial link.

use std::sync::atomic::{AtomicU8, Ordering};

/// The state of the serial link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// The channel is open and I/O is being processed.
    Active,
    /// A close was started; outstanding I/O is being cancelled.
    Closing,
    /// The channel is closed. This state is final.
    Closed,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            ACTIVE => LinkState::Active,
            CLOSING => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }
}

const ACTIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// A [`LinkState`] that can be read from any thread without locking.
///
/// Transitions only go forward: `Active` to `Closing` to `Closed`.
#[derive(Debug)]
pub struct ActivationState(AtomicU8);

impl ActivationState {
    /// Returns a new `ActivationState` in the `Active` state.
    pub fn new() -> Self {
        ActivationState(AtomicU8::new(ACTIVE))
    }

    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get() == LinkState::Active
    }

    /// Moves from `Active` to `Closing`. Returns `true` only for the caller that made the
    /// transition, so the channel is closed at most once.
    pub fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(ACTIVE, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks the link as closed, whatever the current state is.
    pub fn finish_close(&self) {
        self.0.store(CLOSED, Ordering::Release);
    }
}
