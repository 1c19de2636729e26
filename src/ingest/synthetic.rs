//! Synthetic frame source.
//!
//! Generates deterministic frames without touching a decoder or device. Used
//! by tests and demos, selected with `stub://` paths:
//!
//! ```text
//! stub://clip?frames=10&fps=30&width=640&height=480
//! stub://cam?live=1&fps=15&realtime=1
//! stub://broken?frames=20&fail_at=5
//! ```
//!
//! Pixel sample `i` of frame `n` is `(n + i) % 256`, so the first sample of
//! every frame equals its index modulo 256.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};

use super::{CaptureSource, SourceProperties};
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    /// Number of frames before end of stream. Ignored for live sources.
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Behave like a device feed: no end of stream, unknown length.
    pub live: bool,
    /// Fail decoding when this frame index is reached.
    pub fail_at: Option<u64>,
    /// Pace output at `fps` instead of producing as fast as possible.
    pub realtime: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: 100,
            fps: 30.0,
            width: 640,
            height: 480,
            channels: 3,
            live: false,
            fail_at: None,
            realtime: false,
        }
    }
}

impl SyntheticConfig {
    /// Finite "file" with `frames` frames.
    pub fn clip(frames: u64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            name: "clip".to_string(),
            frames,
            fps,
            width,
            height,
            ..Self::default()
        }
    }

    /// Endless "device" feed.
    pub fn live(fps: f64, width: u32, height: u32) -> Self {
        Self {
            name: "live".to_string(),
            fps,
            width,
            height,
            live: true,
            ..Self::default()
        }
    }

    pub fn with_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Parse the part of a `stub://` path after the scheme.
    pub fn parse_descriptor(descriptor: &str) -> Result<Self> {
        let (name, query) = match descriptor.split_once('?') {
            Some((name, query)) => (name, query),
            None => (descriptor, ""),
        };
        let mut config = Self {
            name: if name.is_empty() {
                "synthetic".to_string()
            } else {
                name.to_string()
            },
            ..Self::default()
        };

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub parameter '{}' is missing a value", pair))?;
            match key {
                "frames" => config.frames = parse_param(key, value)?,
                "fps" => config.fps = parse_param(key, value)?,
                "width" => config.width = parse_param(key, value)?,
                "height" => config.height = parse_param(key, value)?,
                "channels" => config.channels = parse_param(key, value)?,
                "fail_at" => config.fail_at = Some(parse_param(key, value)?),
                "live" => config.live = parse_flag(key, value)?,
                "realtime" => config.realtime = parse_flag(key, value)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }

        if config.width == 0 || config.height == 0 || config.channels == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        if !(config.fps.is_finite() && config.fps >= 0.0) {
            return Err(anyhow!("stub fps must be a non-negative number"));
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value '{}' for stub parameter '{}'", value, key))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(anyhow!("stub parameter '{}' expects 0/1 or true/false", key)),
    }
}

/// Deterministic in-memory source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: opened {} ({}x{} @ {} fps, {})",
            config.name,
            config.width,
            config.height,
            config.fps,
            if config.live { "live" } else { "file" }
        );
        Self {
            config,
            frame_count: 0,
            last_frame_at: None,
            closed: false,
        }
    }

    /// Frames handed out so far.
    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let len = (self.config.width as usize)
            * (self.config.height as usize)
            * (self.config.channels as usize);
        (0..len)
            .map(|i| ((i as u64 + self.frame_count) % 256) as u8)
            .collect()
    }

    fn pace(&mut self) {
        if !self.config.realtime || self.config.fps <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.fps);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn is_live(&self) -> bool {
        self.config.live
    }

    fn properties(&self) -> SourceProperties {
        SourceProperties {
            width: self.config.width,
            height: self.config.height,
            raw_fps: self.config.fps,
            total_frames: if self.config.live {
                None
            } else {
                Some(self.config.frames)
            },
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(anyhow!("synthetic source {} is closed", self.config.name));
        }
        if self.config.fail_at == Some(self.frame_count) {
            return Err(anyhow!(
                "synthetic decode failure at frame {}",
                self.frame_count
            ));
        }
        if !self.config.live && self.frame_count >= self.config.frames {
            return Ok(None);
        }

        self.pace();
        let pixels = self.generate_pixels();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.config.channels,
            self.frame_count,
        )?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::info!(
                "SyntheticSource: closed {} after {} frames",
                self.config.name,
                self.frame_count
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
