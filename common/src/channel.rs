use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::frame::Frame;

/// Single-slot, latest-wins handoff between the capture task and the
/// processing loop.
///
/// `put` replaces whatever unconsumed frame is in the slot, so the reader
/// only ever sees the most recent capture. The slot lock is held just long
/// enough to swap an `Option`; the displaced frame is dropped after the
/// lock is released.
#[derive(Debug, Default)]
pub struct FrameChannel {
    slot: Mutex<Option<Frame>>,
    produced: AtomicU64,
    dropped: AtomicU64,
}

/// Counters since the channel was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    pub produced: u64,
    pub dropped: u64,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, discarding any frame the consumer has not taken yet.
    pub fn put(&self, frame: Frame) {
        let seq = frame.seq;
        let displaced = self.lock().replace(frame);
        self.produced.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = displaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(dropped_seq = old.seq, seq, "replaced unconsumed frame");
        }
    }

    /// Take the stored frame, leaving the slot empty.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().take()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    // A panic while holding the lock cannot leave the Option half-written,
    // so a poisoned slot is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
