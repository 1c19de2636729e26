use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ingest::SourceId;
use crate::queue::DEFAULT_QUEUE_SIZE;
use crate::stream::FrameStream;
use crate::StreamError;

const DEFAULT_SOURCE: SourceId = SourceId::Device(0);

pub const ENV_CONFIG: &str = "FRAMESTREAM_CONFIG";
pub const ENV_SOURCE: &str = "FRAMESTREAM_SOURCE";
pub const ENV_QUEUE_SIZE: &str = "FRAMESTREAM_QUEUE_SIZE";
pub const ENV_READ_TIMEOUT_MS: &str = "FRAMESTREAM_READ_TIMEOUT_MS";

/// A source in the config file: `0`, `"0"` or `"clip.mp4"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceValue {
    Index(i64),
    Path(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    source: Option<SourceValue>,
    queue_size: Option<usize>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub source: SourceId,
    pub queue_size: usize,
    /// Upper bound on a single wait for a frame; `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE,
            queue_size: DEFAULT_QUEUE_SIZE,
            read_timeout: None,
        }
    }
}

impl StreamConfig {
    /// Load from the file named by `FRAMESTREAM_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamConfigFile) -> Result<Self> {
        let source = match file.source {
            Some(SourceValue::Index(index)) => SourceId::try_from(index)?,
            // Same rules as FRAMESTREAM_SOURCE: "0" is a device.
            Some(SourceValue::Path(path)) => path.parse()?,
            None => DEFAULT_SOURCE,
        };
        Ok(Self {
            source,
            queue_size: file.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE),
            read_timeout: file.read_timeout_ms.map(Duration::from_millis),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var(ENV_SOURCE) {
            if !source.trim().is_empty() {
                self.source = source.parse()?;
            }
        }
        if let Ok(queue_size) = std::env::var(ENV_QUEUE_SIZE) {
            self.queue_size = queue_size
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a positive integer", ENV_QUEUE_SIZE))?;
        }
        if let Ok(timeout) = std::env::var(ENV_READ_TIMEOUT_MS) {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("{} must be an integer number of milliseconds", ENV_READ_TIMEOUT_MS)
            })?;
            self.read_timeout = Some(Duration::from_millis(millis));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(anyhow!("queue_size must be greater than zero"));
        }
        if self.read_timeout == Some(Duration::ZERO) {
            return Err(anyhow!("read_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Open a stream for this configuration. The stream is not started.
    pub fn open_stream(&self) -> Result<FrameStream, StreamError> {
        FrameStream::open(&self.source, self.queue_size)
    }
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
