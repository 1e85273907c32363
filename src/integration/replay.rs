//! Replay of recorded detections.
//!
//! A recording is a JSON-lines file with one object per frame:
//!
//! ```text
//! {"frame": 0, "width": 1280, "height": 720, "detections": [{"class": "car", "bbox": [100, 80, 140, 120], "confidence": 0.91}]}
//! ```
//!
//! [`ReplayOpener`] serves the frames as a [`VideoSource`] and
//! [`ReplayDetector`] hands back the recorded detections for each frame, so a
//! recording exercises the full pipeline without a camera or a model.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::tracker::{Detection, VehicleClass};

use super::detector::Detector;
use super::source::{Frame, SourceDescriptor, SourceOpener, VideoSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDetection {
    pub class: VehicleClass,
    /// Corner format (x1, y1, x2, y2)
    pub bbox: [f32; 4],
    pub confidence: f32,
}

impl RecordedDetection {
    pub fn to_detection(&self) -> Detection {
        let [x1, y1, x2, y2] = self.bbox;
        Detection::new(self.class.clone(), x1, y1, x2, y2, self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<RecordedDetection>,
}

/// Frames of a recording, ordered by frame index.
#[derive(Debug, Clone)]
pub struct Recording {
    path: PathBuf,
    frames: Vec<RecordedFrame>,
    by_index: HashMap<u64, usize>,
}

impl Recording {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(path, BufReader::new(file))
    }

    /// Parse JSON lines from `reader`; `path` identifies the recording.
    pub fn from_reader(path: impl Into<PathBuf>, reader: impl BufRead) -> Result<Self, SourceError> {
        let mut frames = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: RecordedFrame =
                serde_json::from_str(&line).map_err(|source| SourceError::Recording {
                    line: lineno + 1,
                    source,
                })?;
            frames.push(frame);
        }
        frames.sort_by_key(|f| f.frame);

        let by_index = frames
            .iter()
            .enumerate()
            .map(|(pos, f)| (f.frame, pos))
            .collect();

        Ok(Self {
            path: path.into(),
            frames,
            by_index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn detections_for(&self, frame_index: u64) -> Option<&[RecordedDetection]> {
        self.by_index
            .get(&frame_index)
            .map(|&pos| self.frames[pos].detections.as_slice())
    }
}

/// Serves the frames of a recording in order.
pub struct ReplaySource {
    recording: Arc<Recording>,
    cursor: usize,
    pace: Option<Duration>,
}

impl ReplaySource {
    pub fn new(recording: Arc<Recording>) -> Self {
        Self {
            recording,
            cursor: 0,
            pace: None,
        }
    }

    /// Sleep `pace` before every frame to mimic a live stream.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

impl VideoSource for ReplaySource {
    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(recorded) = self.recording.frames.get(self.cursor) else {
            return Ok(None);
        };
        if let Some(pace) = self.pace {
            thread::sleep(pace);
        }
        self.cursor += 1;
        Ok(Some(Frame::new(
            recorded.frame,
            recorded.width,
            recorded.height,
            Vec::new(),
        )))
    }

    fn release(&mut self) {
        debug!(
            recording = %self.recording.path.display(),
            frames_read = self.cursor,
            "replay source released"
        );
    }
}

/// Opens [`ReplaySource`]s for the recording's own path only.
#[derive(Clone)]
pub struct ReplayOpener {
    recording: Arc<Recording>,
    pace: Option<Duration>,
}

impl ReplayOpener {
    pub fn new(recording: Arc<Recording>) -> Self {
        Self {
            recording,
            pace: None,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

impl SourceOpener for ReplayOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn VideoSource>, SourceError> {
        match descriptor {
            SourceDescriptor::File(path) if path == self.recording.path() => {
                let source = ReplaySource::new(self.recording.clone());
                Ok(Box::new(match self.pace {
                    Some(pace) => source.with_pace(pace),
                    None => source,
                }))
            }
            other => Err(SourceError::Open(format!("no recording for {other}"))),
        }
    }
}

/// Returns the recorded detections of each frame.
#[derive(Clone)]
pub struct ReplayDetector {
    recording: Arc<Recording>,
}

impl ReplayDetector {
    pub fn new(recording: Arc<Recording>) -> Self {
        Self { recording }
    }
}

impl Detector for ReplayDetector {
    type Error = Infallible;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        Ok(self
            .recording
            .detections_for(frame.index)
            .map(|dets| dets.iter().map(RecordedDetection::to_detection).collect())
            .unwrap_or_default())
    }
}
