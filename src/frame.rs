//! Decoded frame container.
//!
//! - `Frame`: owned pixel buffer (rows x cols x channels, 8-bit samples).
//!
//! Frames are deliberately not `Clone`. A frame is moved from the capture
//! source into the bounded queue and from the queue to the caller, so there is
//! never more than one owner of the pixel data.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// One decoded image unit from a video source.
pub struct Frame {
    /// Row-major, interleaved samples. Length is `width * height * channels`.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub channels: u8,

    /// Zero-based position of this frame in the source's production order.
    pub index: u64,

    /// Monotonic instant at which the source handed the frame over.
    captured_at: Instant,
}

// Explicitly NOT implementing Clone: ownership transfers, it is never shared.

impl Frame {
    /// Wrap a decoded buffer. The buffer length must match the declared shape.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: u64) -> Result<Self> {
        if channels == 0 {
            return Err(anyhow!("frame must have at least one channel"));
        }
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                channels
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            index,
            captured_at: Instant::now(),
        })
    }

    /// Array shape as `(rows, cols, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Samples of a single pixel, or `None` when out of bounds.
    pub fn pixel(&self, row: u32, col: u32) -> Option<&[u8]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let channels = self.channels as usize;
        let start = ((row as usize) * (self.width as usize) + col as usize) * channels;
        self.data.get(start..start + channels)
    }

    /// Give up the frame and keep the pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Time since the source produced this frame.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is omitted; frames are large.
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
