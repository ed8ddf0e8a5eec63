//! Fixed-size slot pool bounding concurrently executing scans.
//!
//! The pool is a bounded crossbeam channel pre-filled with one token per
//! slot. Acquiring receives a token (waiting up to a timeout); the returned
//! guard sends it back when dropped, so a panicking scan still frees its slot.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

#[derive(Debug)]
pub struct ConcurrencyLimiter {
    capacity: usize,
    tx: Sender<()>,
    rx: Receiver<()>,
}

/// An occupied slot; released on drop.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    tx: &'a Sender<()>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        // Capacity is exactly the number of tokens, so this never blocks.
        let _ = self.tx.try_send(());
    }
}

impl ConcurrencyLimiter {
    /// Pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        for _ in 0..capacity {
            let _ = tx.try_send(());
        }
        Self { capacity, tx, rx }
    }

    /// Wait up to `wait` for a free slot.
    pub fn acquire(&self, wait: Duration) -> Option<SlotGuard<'_>> {
        match self.rx.recv_timeout(wait) {
            Ok(()) => Some(SlotGuard { tx: &self.tx }),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<SlotGuard<'_>> {
        self.rx.try_recv().ok().map(|()| SlotGuard { tx: &self.tx })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.rx.len()
    }
}
