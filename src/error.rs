//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by external collaborators such as detectors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

/// Failures reported by a [`VideoSource`](crate::integration::VideoSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open: {0}")]
    Open(String),
    #[error("frame read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed recording at line {line}: {source}")]
    Recording {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures reported by a [`SpeedLog`](crate::log::SpeedLog) writer.
#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video source {descriptor} unavailable: {cause}")]
    SourceUnavailable {
        descriptor: String,
        #[source]
        cause: SourceError,
    },
    #[error("detector failed on frame {frame_index}: {source}")]
    DetectorFailure {
        frame_index: u64,
        #[source]
        source: BoxError,
    },
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("processing thread panicked")]
    WorkerPanicked,
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}
