//! Errors surfaced at the stream boundary.
//!
//! Backends report failures with `anyhow`; anything a caller has to branch on
//! is converted into a `StreamError` before it leaves the crate.

use thiserror::Error;

use crate::stream::StreamState;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The identifier is neither a device index nor a local file path.
    #[error("invalid source identifier {0:?}: expected a device index or a local file path")]
    InvalidSource(String),

    /// The backend could not open the device or file.
    #[error("failed to open video source {source_id}: {cause:#}")]
    SourceOpen {
        source_id: String,
        cause: anyhow::Error,
    },

    #[error("queue size must be at least 1 (got {0})")]
    InvalidQueueSize(usize),

    /// `begin_stream` was called on a stream that is not in the created state.
    #[error("stream cannot be started from the {0:?} state")]
    NotStartable(StreamState),

    #[error("stream has not been started")]
    NotStarted,

    #[error("failed to spawn producer thread")]
    Spawn(#[source] std::io::Error),

    #[error("producer thread panicked")]
    ProducerPanicked,
}

impl StreamError {
    pub(crate) fn open(source_id: impl ToString, cause: anyhow::Error) -> Self {
        StreamError::SourceOpen {
            source_id: source_id.to_string(),
            cause,
        }
    }
}
