//! Threaded frame stream.
//!
//! `FrameStream` decouples decoding from consumption. One background producer
//! thread pulls frames from a `CaptureSource` into a bounded queue; the
//! caller pops them with `read()`.
//!
//! Lifecycle: `Created` -> `begin_stream()` -> `Running` -> (end of stream or
//! `release()`) -> `Released`. A released stream cannot be restarted.
//!
//! The stop flag is monotonic. The producer sets it itself when the source
//! ends or fails, `release()` sets it on request. Once set, fps and frame
//! count report zero.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::StreamError;
use crate::frame::Frame;
use crate::ingest::{self, CaptureSource, SourceId, SourceProperties};
use crate::queue::{frame_queue, Pop, Push, QueueReader, QueueWriter, DEFAULT_QUEUE_SIZE};

const PRODUCER_THREAD_NAME: &str = "framestream-producer";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Running,
    Released,
}

/// Result of a read.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// The stream stopped and every buffered frame has been read.
    EndOfStream,
    /// Only from `read_timeout`: nothing arrived in time, the stream is still live.
    TimedOut,
}

impl ReadOutcome {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            ReadOutcome::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Total length of the source, as far as it is knowable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameCount {
    /// Frames in the file. Zero once the stream has stopped.
    Total(u64),
    /// The container does not record its length.
    Unknown,
    /// Live sources have no total length.
    Live,
}

impl FrameCount {
    pub fn total(self) -> Option<u64> {
        match self {
            FrameCount::Total(n) => Some(n),
            _ => None,
        }
    }
}

/// Snapshot of a stream for status reporting.
#[derive(Clone, Debug)]
pub struct StreamStatus {
    pub state: StreamState,
    pub buffered: usize,
    pub capacity: usize,
    pub frames_produced: u64,
    pub failure: Option<String>,
}

/// State shared between the stream handle and its producer thread.
#[derive(Default)]
struct StreamShared {
    kill_stream: AtomicBool,
    frames_produced: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl StreamShared {
    fn stop(&self) {
        self.kill_stream.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.kill_stream.load(Ordering::SeqCst)
    }

    fn record_failure(&self, message: String) {
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert(message);
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|failure| failure.clone())
    }
}

/// Bounded single-producer/single-consumer frame stream.
pub struct FrameStream {
    label: String,
    live: bool,
    properties: SourceProperties,
    /// Held until `begin_stream` moves it to the producer.
    source: Option<Box<dyn CaptureSource>>,
    /// Held until `begin_stream` moves it to the producer.
    writer: Option<QueueWriter>,
    reader: QueueReader,
    shared: Arc<StreamShared>,
    /// Dropping this wakes a producer waiting on a full queue.
    stop_tx: Option<Sender<()>>,
    producer: Option<JoinHandle<()>>,
    started: bool,
}

impl FrameStream {
    /// Open `source` (device index or file path) with a queue of `queue_size` frames.
    pub fn new<S>(source: S, queue_size: usize) -> Result<Self, StreamError>
    where
        S: TryInto<SourceId, Error = StreamError>,
    {
        let id = source.try_into()?;
        Self::open(&id, queue_size)
    }

    pub fn open(id: &SourceId, queue_size: usize) -> Result<Self, StreamError> {
        if queue_size == 0 {
            return Err(StreamError::InvalidQueueSize(queue_size));
        }
        let source = ingest::open(id)?;
        // A path may still open a live feed (`stub://cam?live=1`); a device never opens a file.
        let live = source.is_live();
        debug_assert!(live || !id.is_live(), "device {} opened a finite source", id);
        Self::build(id.to_string(), live, source, queue_size)
    }

    /// Stream from an already opened source. Liveness comes from the source.
    pub fn with_source(
        source: Box<dyn CaptureSource>,
        queue_size: usize,
    ) -> Result<Self, StreamError> {
        let label = source.name().to_string();
        let live = source.is_live();
        Self::build(label, live, source, queue_size)
    }

    /// Device 0 with the default queue size.
    ///
    /// Opens a capture device, so call it deliberately; nothing in this crate
    /// opens a device on its own.
    pub fn open_default() -> Result<Self, StreamError> {
        Self::open(&SourceId::Device(0), DEFAULT_QUEUE_SIZE)
    }

    fn build(
        label: String,
        live: bool,
        source: Box<dyn CaptureSource>,
        queue_size: usize,
    ) -> Result<Self, StreamError> {
        if queue_size == 0 {
            return Err(StreamError::InvalidQueueSize(queue_size));
        }
        let properties = source.properties();
        let (writer, reader) = frame_queue(queue_size);
        Ok(Self {
            label,
            live,
            properties,
            source: Some(source),
            writer: Some(writer),
            reader,
            shared: Arc::new(StreamShared::default()),
            stop_tx: None,
            producer: None,
            started: false,
        })
    }

    /// Spawn the producer thread. Returns immediately.
    pub fn begin_stream(&mut self) -> Result<&mut Self, StreamError> {
        let state = self.state();
        if state != StreamState::Created {
            return Err(StreamError::NotStartable(state));
        }
        let (Some(source), Some(writer)) = (self.source.take(), self.writer.take()) else {
            return Err(StreamError::NotStartable(StreamState::Released));
        };

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        self.started = true;
        let spawned = std::thread::Builder::new()
            .name(PRODUCER_THREAD_NAME.to_string())
            .spawn(move || run_producer(source, writer, stop_rx, shared));

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.producer = Some(handle);
                log::info!(
                    "stream {} started (queue capacity {})",
                    self.label,
                    self.reader.capacity()
                );
                Ok(self)
            }
            Err(err) => {
                self.shared.stop();
                Err(StreamError::Spawn(err))
            }
        }
    }

    /// Block until the next frame or the end of the stream.
    pub fn read(&self) -> Result<ReadOutcome, StreamError> {
        if self.state() == StreamState::Created {
            return Err(StreamError::NotStarted);
        }
        Ok(match self.reader.pop() {
            Some(frame) => ReadOutcome::Frame(frame),
            None => ReadOutcome::EndOfStream,
        })
    }

    /// Like `read`, but gives up after `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> Result<ReadOutcome, StreamError> {
        if self.state() == StreamState::Created {
            return Err(StreamError::NotStarted);
        }
        Ok(match self.reader.pop_timeout(timeout) {
            Pop::Frame(frame) => ReadOutcome::Frame(frame),
            Pop::Closed => ReadOutcome::EndOfStream,
            Pop::TimedOut => ReadOutcome::TimedOut,
        })
    }

    /// False only once the stream has stopped and the queue is drained.
    pub fn more(&self) -> bool {
        // Flag first: the producer sets it after its last push, so a set flag
        // guarantees every frame is already visible in the queue.
        let stopped = self.shared.is_stopped();
        !stopped || !self.reader.is_empty()
    }

    /// Stop the producer and wait for it to exit. Safe to call repeatedly.
    ///
    /// Frames already buffered stay readable.
    pub fn release(&mut self) -> Result<(), StreamError> {
        self.shared.stop();
        self.stop_tx.take();
        self.writer.take();
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if let Some(handle) = self.producer.take() {
            handle.join().map_err(|_| StreamError::ProducerPanicked)?;
            log::info!(
                "stream {} released ({} frames produced)",
                self.label,
                self.shared.frames_produced.load(Ordering::SeqCst)
            );
        }
        Ok(())
    }

    pub fn count_frames(&self) -> FrameCount {
        if self.live {
            return FrameCount::Live;
        }
        if self.shared.is_stopped() {
            return FrameCount::Total(0);
        }
        match self.properties.total_frames {
            Some(total) => FrameCount::Total(total),
            None => FrameCount::Unknown,
        }
    }

    /// Nominal (rounded up) frame rate; 0 once stopped.
    pub fn get_fps(&self) -> u32 {
        if self.shared.is_stopped() {
            0
        } else {
            self.properties.nominal_fps()
        }
    }

    pub fn get_resolution(&self) -> (u32, u32) {
        self.properties.resolution()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> StreamState {
        if self.shared.is_stopped() {
            StreamState::Released
        } else if self.started {
            StreamState::Running
        } else {
            StreamState::Created
        }
    }

    /// Decode error that ended the stream early, if any.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure()
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.state(),
            buffered: self.reader.len(),
            capacity: self.reader.capacity(),
            frames_produced: self.shared.frames_produced.load(Ordering::SeqCst),
            failure: self.failure(),
        }
    }

    /// Iterate frames until the end of the stream.
    ///
    /// A stream that has not been started yields nothing; call `begin_stream`
    /// first.
    pub fn frames(&self) -> Frames<'_> {
        Frames { stream: self }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::error!("stream {} release on drop failed: {}", self.label, err);
        }
    }
}

/// Blocking iterator over a stream's frames.
pub struct Frames<'a> {
    stream: &'a FrameStream,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        match self.stream.read() {
            Ok(outcome) => outcome.into_frame(),
            Err(err) => {
                log::debug!("stream {} yields no frames: {}", self.stream.label, err);
                None
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Producer loop
// ----------------------------------------------------------------------------

fn run_producer(
    mut source: Box<dyn CaptureSource>,
    writer: QueueWriter,
    stop: Receiver<()>,
    shared: Arc<StreamShared>,
) {
    log::debug!("producer started for {} source", source.name());
    loop {
        if shared.is_stopped() {
            break;
        }
        match source.next_frame() {
            Ok(Some(frame)) => match writer.push(frame, &stop) {
                Push::Delivered => {
                    shared.frames_produced.fetch_add(1, Ordering::SeqCst);
                }
                Push::Stopped => break,
                Push::Disconnected => {
                    log::debug!("frame queue reader dropped, producer exiting");
                    break;
                }
            },
            Ok(None) => {
                log::info!(
                    "{} source reached end of stream after {} frames",
                    source.name(),
                    shared.frames_produced.load(Ordering::SeqCst)
                );
                break;
            }
            Err(err) => {
                log::warn!("{} source failed to decode: {:#}", source.name(), err);
                shared.record_failure(format!("{:#}", err));
                break;
            }
        }
    }

    source.close();
    // Stop after the last push so `more()` never misses a buffered frame.
    shared.stop();
    drop(writer);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
