//! framestream
//!
//! Threaded, bounded frame streaming for video files and capture devices.
//!
//! # Architecture
//!
//! A `FrameStream` owns one `CaptureSource`, one bounded queue and one
//! background producer thread:
//!
//! ```text
//! CaptureSource -> producer thread -> bounded queue -> read() -> caller
//! ```
//!
//! Decoding runs ahead of consumption until the queue is full, then waits
//! (backpressure, never frame loss). The caller drives consumption with
//! `read()` / `more()` and stops the producer with `release()`.
//!
//! # Module Structure
//!
//! - `frame`: Decoded frame container
//! - `ingest`: Capture sources (synthetic, FFmpeg files, V4L2 devices)
//! - `stream`: `FrameStream` lifecycle and producer loop
//! - `config`: File + environment configuration
//! - `ui`: Terminal progress for the command-line tools
//!
//! ```no_run
//! use framestream::{FrameStream, ReadOutcome};
//!
//! # fn main() -> Result<(), framestream::StreamError> {
//! let mut stream = FrameStream::new("clip.mp4", 128)?;
//! stream.begin_stream()?;
//! while let ReadOutcome::Frame(frame) = stream.read()? {
//!     println!("frame {} is {:?}", frame.index, frame.shape());
//! }
//! stream.release()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
mod queue;
pub mod stream;
pub mod ui;

pub use error::StreamError;
pub use frame::Frame;
pub use ingest::{
    CaptureSource, SourceId, SourceProperties, SyntheticConfig, SyntheticSource, STUB_SCHEME,
};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{v4l2::V4l2Config, V4l2Source};
pub use queue::DEFAULT_QUEUE_SIZE;
pub use stream::{FrameCount, FrameStream, Frames, ReadOutcome, StreamState, StreamStatus};
