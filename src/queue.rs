//! Byte queues shared between the service thread and callers. See [`ReadBuffer`] and
//! [`WriteQueue`].
//!
//! Neither type does any locking itself; the client keeps each one behind its own lock.

use std::collections::VecDeque;

/// Bytes received from the channel that have not yet been taken by a caller.
///
/// Bytes are appended in arrival order and taken in FIFO order.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    bytes: VecDeque<u8>,
}

impl ReadBuffer {
    /// Returns a new empty `ReadBuffer`.
    pub fn new() -> Self {
        ReadBuffer {
            bytes: VecDeque::new(),
        }
    }

    /// Appends the bytes of a single read completion.
    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend(data);
    }

    /// Removes and returns everything in the buffer.
    pub fn drain_all(&mut self) -> Vec<u8> {
        self.bytes.drain(..).collect()
    }

    /// Removes and returns the oldest byte, or `None` if the buffer is empty.
    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// A byte at the front of a [`WriteQueue`] that is about to be transmitted.
///
/// It must be handed back to [`WriteQueue::complete`] once the transmission has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingWrite {
    /// The byte to transmit.
    pub byte: u8,
    /// The purge generation the byte was taken from.
    generation: u64,
}

/// Bytes waiting to be transmitted, oldest first.
///
/// The front byte is only removed by [`complete`][Self::complete], i.e. after its transmission
/// has been acknowledged. Clearing the queue starts a new generation, so that a transmission that
/// was already in flight when the queue was cleared does not remove a byte queued afterwards.
#[derive(Debug, Default)]
pub struct WriteQueue {
    bytes: VecDeque<u8>,
    generation: u64,
}

impl WriteQueue {
    /// Returns a new empty `WriteQueue`.
    pub fn new() -> Self {
        WriteQueue {
            bytes: VecDeque::new(),
            generation: 0,
        }
    }

    /// Adds a byte to the back of the queue. Returns whether the queue was empty beforehand, in
    /// which case nothing is being transmitted and the caller must start a transmission.
    pub fn push(&mut self, byte: u8) -> bool {
        let was_empty = self.bytes.is_empty();
        self.bytes.push_back(byte);
        was_empty
    }

    /// Like [`push`][Self::push], but for several bytes at once. Returns `false` if `data` is
    /// empty.
    pub fn extend(&mut self, data: &[u8]) -> bool {
        let was_empty = self.bytes.is_empty();
        self.bytes.extend(data);
        was_empty && !data.is_empty()
    }

    /// Returns the byte that should be transmitted next, without removing it.
    pub fn front(&self) -> Option<PendingWrite> {
        self.bytes.front().map(|&byte| PendingWrite {
            byte,
            generation: self.generation,
        })
    }

    /// Marks the transmission of `pending` as finished, removing it from the queue unless the
    /// queue was cleared in the meantime. Returns whether more bytes are waiting.
    pub fn complete(&mut self, pending: PendingWrite) -> bool {
        if pending.generation == self.generation {
            self.bytes.pop_front();
        }

        !self.bytes.is_empty()
    }

    /// Discards every byte that has not been transmitted.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}
