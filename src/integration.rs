//! Integration module for connecting detectors and video sources with the
//! tracking pipeline.
//!
//! This module provides the collaborator traits ([`Detector`], [`VideoSource`]),
//! the synchronous per-frame [`SpeedPipeline`] and the threaded
//! [`PipelineController`] that owns the run/stop lifecycle.

mod builder;
mod controller;
mod detector;
mod events;
mod pipeline;
pub mod replay;
mod source;

pub use builder::DetectionBuilder;
pub use controller::{PipelineController, RunSummary, StopHandle, StopReason};
pub use detector::{DetectionFilter, Detector, IntoDetections};
pub use events::{AnnotatedFrame, Overlay, PipelineState, SpeedEvent, StatusUpdate};
pub use pipeline::{FrameReport, SpeedPipeline};
pub use source::{Frame, SourceDescriptor, SourceGuard, SourceOpener, VideoSource};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnDetector, BurnDetectorError, BurnModel, RawDetection};
