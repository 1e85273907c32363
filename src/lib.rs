//! Vehicle tracking and speed estimation over per-frame object detections.
//!
//! Detections from an external detector are associated into persistent
//! [`Track`]s, each matched track gets a smoothed real-world speed from its
//! pixel displacement, and the result is classified against a speed limit.
//! [`PipelineController`] runs that cycle on a dedicated thread against a
//! [`VideoSource`] and reports events, annotated frames and status to the host.

pub mod config;
pub mod error;
pub mod estimation;
pub mod integration;
pub mod log;
pub mod tracker;

pub use config::{Calibration, PipelineConfig};
pub use error::{ConfigError, PipelineError};
pub use estimation::{SpeedClass, SpeedEstimator, classify};
pub use integration::{
    AnnotatedFrame, Detector, Frame, PipelineController, PipelineState, SourceDescriptor,
    SpeedEvent, SpeedPipeline, VideoSource,
};
pub use log::{LogEntry, SpeedLog};
pub use tracker::{Detection, Rect, Track, TrackId, TrackState, Tracker, TrackerConfig, VehicleClass};
