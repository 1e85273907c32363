//! Video source collaborator: frame acquisition and guaranteed release.

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame in the stream, strictly increasing per source
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    /// Raw pixel data; layout is agreed between source and detector
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            index,
            timestamp: Utc::now(),
            width,
            height,
            data: data.into(),
        }
    }

    /// Frame without pixel data, for sources whose detections come from elsewhere.
    pub fn empty(index: u64) -> Self {
        Self::new(index, 0, 0, Vec::new())
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceDescriptor {
    /// Capture device index
    Camera(u32),
    /// Recorded video file
    File(PathBuf),
}

impl FromStr for SourceDescriptor {
    type Err = Infallible;

    /// `"webcam"`, an empty string or a bare device number select a camera;
    /// anything else is a file path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("webcam") {
            return Ok(Self::Camera(0));
        }
        match s.parse::<u32>() {
            Ok(index) => Ok(Self::Camera(index)),
            Err(_) => Ok(Self::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera {index}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// An opened video stream. Owned by the processing thread only.
pub trait VideoSource: Send {
    /// Next frame, `Ok(None)` at end of stream.
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Release the underlying device or file. Called exactly once, by [`SourceGuard`].
    fn release(&mut self);
}

/// Opens a [`VideoSource`] for a descriptor.
pub trait SourceOpener: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn VideoSource>, SourceError>;
}

impl<F> SourceOpener for F
where
    F: Fn(&SourceDescriptor) -> Result<Box<dyn VideoSource>, SourceError> + Send + Sync,
{
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn VideoSource>, SourceError> {
        self(descriptor)
    }
}

/// Releases the wrapped source when dropped, whichever way the loop exits.
pub struct SourceGuard {
    source: Box<dyn VideoSource>,
}

impl SourceGuard {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self { source }
    }

    pub fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.read()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.source.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_descriptor_parsing() {
        assert_eq!("Webcam".parse::<SourceDescriptor>(), Ok(SourceDescriptor::Camera(0)));
        assert_eq!("2".parse::<SourceDescriptor>(), Ok(SourceDescriptor::Camera(2)));
        assert_eq!(
            "clips/highway.mp4".parse::<SourceDescriptor>(),
            Ok(SourceDescriptor::File(PathBuf::from("clips/highway.mp4")))
        );
    }

    struct CountingSource {
        released: Arc<AtomicUsize>,
    }

    impl VideoSource for CountingSource {
        fn read(&mut self) -> Result<Option<Frame>, SourceError> {
            Err(SourceError::Read("broken pipe".into()))
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = SourceGuard::new(Box::new(CountingSource {
                released: released.clone(),
            }));
            assert!(guard.read().is_err());
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
