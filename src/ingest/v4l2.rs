//! V4L2 capture source.
//!
//! This module provides `V4l2Source` for live capture from local V4L2 devices.
//! A device index `N` maps to the node `/dev/videoN`.
//!
//! The V4L2 source is responsible for:
//! - Negotiating a packed RGB format at the requested resolution
//! - Reporting the resolution and frame rate the driver actually accepted
//! - Capturing frames into owned buffers via memory-mapped streaming
//!
//! Live sources never report end of stream; capture errors end the stream.

use anyhow::{bail, Context, Result};
use ouroboros::self_referencing;

use super::{CaptureSource, SourceProperties};
use crate::frame::Frame;

/// Packed 24-bit RGB, the only layout `next_frame` knows how to slice.
const RGB24: &[u8; 4] = b"RGB3";

/// Capture parameters requested from the driver.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0").
    pub device: String,
    /// Requested frame rate. The driver may pick another.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl V4l2Config {
    pub fn for_index(index: u32) -> Self {
        Self {
            device: format!("/dev/video{}", index),
            ..Self::default()
        }
    }
}

/// Live device source backed by libv4l.
pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceV4l2State>,
    properties: SourceProperties,
    frame_count: u64,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(index: u32) -> Result<Self> {
        Self::with_config(V4l2Config::for_index(index))
    }

    pub fn with_config(config: V4l2Config) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(RGB24);

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        ensure_rgb24(&config.device, &format)?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let raw_fps = match device.params() {
            Ok(params) if params.interval.numerator > 0 => {
                params.interval.denominator as f64 / params.interval.numerator as f64
            }
            _ => config.target_fps as f64,
        };

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        let properties = SourceProperties {
            width: format.width,
            height: format.height,
            raw_fps,
            total_frames: None,
        };
        log::info!(
            "V4l2Source: connected to {} ({}x{} @ {:.2} fps)",
            config.device,
            properties.width,
            properties.height,
            raw_fps
        );

        Ok(Self {
            config,
            state: Some(state),
            properties,
            frame_count: 0,
        })
    }
}

/// Reject formats other than packed RGB24; YUYV or MJPEG buffers would be
/// misread as pixels.
fn ensure_rgb24(device: &str, format: &v4l::Format) -> Result<()> {
    if format.fourcc != v4l::FourCC::new(RGB24) {
        bail!(
            "v4l2 device {} does not support RGB3 capture (driver chose {})",
            device,
            format.fourcc
        );
    }
    Ok(())
}

impl CaptureSource for V4l2Source {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn is_live(&self) -> bool {
        true
    }

    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device is closed")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;

        let expected = (self.properties.width as usize) * (self.properties.height as usize) * 3;
        let pixels = buf
            .get(..expected)
            .context("v4l2 buffer is shorter than the negotiated format")?
            .to_vec();
        let frame = Frame::new(
            pixels,
            self.properties.width,
            self.properties.height,
            3,
            self.frame_count,
        )?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Source: closed {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }
}
