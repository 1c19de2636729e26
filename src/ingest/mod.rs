//! Capture sources.
//!
//! This module provides the sources a `FrameStream` pulls frames from:
//! - Synthetic `stub://` sources (testing, demos)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 devices addressed by index (feature: ingest-v4l2)
//!
//! Every backend implements `CaptureSource`. A source reports its static
//! properties once opened and then yields frames until end of stream.
//! Sources are driven by exactly one thread at a time; after
//! `FrameStream::begin_stream` that is the producer thread.

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::StreamError;
use crate::frame::Frame;

pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Path prefix that selects the synthetic backend.
pub const STUB_SCHEME: &str = "stub://";

// ----------------------------------------------------------------------------
// SourceId: device index or file path
// ----------------------------------------------------------------------------

/// Identifies the video source a stream opens.
///
/// A device index implies a live source; a path implies a finite file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceId {
    Device(u32),
    Path(PathBuf),
}

impl SourceId {
    pub fn is_live(&self) -> bool {
        matches!(self, SourceId::Device(_))
    }

    fn from_index(index: i64) -> Result<Self, StreamError> {
        u32::try_from(index)
            .map(SourceId::Device)
            .map_err(|_| StreamError::InvalidSource(index.to_string()))
    }

    fn from_path(path: PathBuf) -> Result<Self, StreamError> {
        let raw = path.to_string_lossy();
        if !is_local_file_path(&raw) {
            return Err(StreamError::InvalidSource(raw.into_owned()));
        }
        Ok(SourceId::Path(path))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "device:{}", index),
            SourceId::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Strings made only of ASCII digits (optionally signed) are device indices,
/// everything else is a path.
impl FromStr for SourceId {
    type Err = StreamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let index: i64 = trimmed
                .parse()
                .map_err(|_| StreamError::InvalidSource(value.to_string()))?;
            return Self::from_index(index);
        }
        Self::from_path(PathBuf::from(value))
    }
}

impl TryFrom<i32> for SourceId {
    type Error = StreamError;
    fn try_from(index: i32) -> Result<Self, Self::Error> {
        Self::from_index(index as i64)
    }
}

impl TryFrom<i64> for SourceId {
    type Error = StreamError;
    fn try_from(index: i64) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

impl TryFrom<u32> for SourceId {
    type Error = StreamError;
    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Ok(SourceId::Device(index))
    }
}

impl TryFrom<&str> for SourceId {
    type Error = StreamError;
    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::from_path(PathBuf::from(path))
    }
}

impl TryFrom<String> for SourceId {
    type Error = StreamError;
    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::from_path(PathBuf::from(path))
    }
}

impl TryFrom<&Path> for SourceId {
    type Error = StreamError;
    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        Self::from_path(path.to_path_buf())
    }
}

impl TryFrom<PathBuf> for SourceId {
    type Error = StreamError;
    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::from_path(path)
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

// ----------------------------------------------------------------------------
// CaptureSource: decoder contract
// ----------------------------------------------------------------------------

/// Static properties of an open source. Immutable for the source's lifetime.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceProperties {
    pub width: u32,
    pub height: u32,
    /// Frame rate as reported by the decoder (may be fractional, e.g. 29.97).
    pub raw_fps: f64,
    /// Total frame count; `None` for live sources or containers that do not say.
    pub total_frames: Option<u64>,
}

impl SourceProperties {
    /// Frame rate rounded up to a whole number.
    pub fn nominal_fps(&self) -> u32 {
        if self.raw_fps.is_finite() && self.raw_fps > 0.0 {
            self.raw_fps.ceil() as u32
        } else {
            0
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Decoder/device abstraction a `FrameStream` reads from.
pub trait CaptureSource: Send {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// True for unbounded device feeds, false for finite files.
    fn is_live(&self) -> bool;

    fn properties(&self) -> SourceProperties;

    /// Decode the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying handle. Called once, after the last `next_frame`.
    fn close(&mut self) {}
}

/// Open the backend that serves `id`.
pub fn open(id: &SourceId) -> Result<Box<dyn CaptureSource>, StreamError> {
    match id {
        SourceId::Path(path) => {
            let raw = path.to_string_lossy();
            if let Some(descriptor) = raw.strip_prefix(STUB_SCHEME) {
                let config = SyntheticConfig::parse_descriptor(descriptor)
                    .map_err(|e| StreamError::open(id, e))?;
                return Ok(Box::new(SyntheticSource::new(config)));
            }
            open_file(path).map_err(|e| StreamError::open(id, e))
        }
        SourceId::Device(index) => open_device(*index).map_err(|e| StreamError::open(id, e)),
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(path: &Path) -> Result<Box<dyn CaptureSource>> {
    Ok(Box::new(file_ffmpeg::FfmpegFileSource::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(_path: &Path) -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!("file decoding requires the ingest-file-ffmpeg feature")
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(index: u32) -> Result<Box<dyn CaptureSource>> {
    Ok(Box::new(V4l2Source::open(index)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(_index: u32) -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!("device capture requires the ingest-v4l2 feature")
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
