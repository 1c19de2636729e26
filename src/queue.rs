//! Bounded frame queue between the producer thread and the caller.
//!
//! The queue is split into a writer (owned by the producer) and a reader
//! (owned by the stream). Capacity is fixed at creation; a full queue makes
//! the writer wait rather than drop frames. Dropping the writer closes the
//! queue: the reader drains what is buffered and then reports the end.

use crossbeam_channel::{
    bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError,
};
use std::time::Duration;

use crate::frame::Frame;

/// Default queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 128;

/// Create a queue holding at most `capacity` frames. `capacity` must be >= 1.
pub(crate) fn frame_queue(capacity: usize) -> (QueueWriter, QueueReader) {
    let (tx, rx) = bounded(capacity);
    (QueueWriter { tx, capacity }, QueueReader { rx, capacity })
}

/// Result of handing a frame to the queue.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Push {
    Delivered,
    /// The stop signal fired while waiting for space. The frame is discarded.
    Stopped,
    /// The reader is gone.
    Disconnected,
}

pub(crate) struct QueueWriter {
    tx: Sender<Frame>,
    capacity: usize,
}

impl QueueWriter {
    /// Push a frame, waiting for space when full.
    ///
    /// The wait ends as soon as either a slot frees up or `stop` becomes
    /// ready (a message or a disconnected sender).
    pub(crate) fn push(&self, frame: Frame, stop: &Receiver<()>) -> Push {
        let frame = match self.tx.try_send(frame) {
            Ok(()) => return Push::Delivered,
            Err(TrySendError::Disconnected(_)) => return Push::Disconnected,
            Err(TrySendError::Full(frame)) => frame,
        };

        log::debug!(
            "frame queue full ({} frames), producer waiting",
            self.capacity
        );
        select! {
            send(self.tx, frame) -> res => match res {
                Ok(()) => Push::Delivered,
                Err(_) => Push::Disconnected,
            },
            recv(stop) -> _ => Push::Stopped,
        }
    }
}

pub(crate) struct QueueReader {
    rx: Receiver<Frame>,
    capacity: usize,
}

/// Result of a bounded wait on the queue.
#[derive(Debug)]
pub(crate) enum Pop {
    Frame(Frame),
    Closed,
    TimedOut,
}

impl QueueReader {
    /// Block until a frame is available. `None` once closed and drained.
    pub(crate) fn pop(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Pop::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Pop::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
